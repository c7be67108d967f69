//! # Application Layer
//!
//! Use cases and the interface boundary between the domain and the
//! connector adapters.

pub mod interfaces;
pub mod use_cases;

pub use interfaces::*;
pub use use_cases::*;
