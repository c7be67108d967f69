mod answer;
mod ingest;
mod manifest;
mod search;

pub use answer::*;
pub use ingest::*;
pub use manifest::*;
pub use search::*;
