use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn file_too_large(msg: impl Into<String>) -> Self {
        Self::FileTooLarge(msg.into())
    }

    pub fn unsupported_type(msg: impl Into<String>) -> Self {
        Self::UnsupportedType(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::ExtractionFailed(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeFailed(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::EmbeddingFailed(msg.into())
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn cache_unavailable(msg: impl Into<String>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Soft errors skip the file and let a scan continue.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::FileTooLarge(_)
                | Self::UnsupportedType(_)
                | Self::ExtractionFailed(_)
                | Self::DecodeFailed(_)
                | Self::EmbeddingFailed(_)
                | Self::CacheUnavailable(_)
                | Self::IoError(_)
        )
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::DimensionMismatch(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Short tag used in scan reports and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileTooLarge(_) => "FileTooLarge",
            Self::UnsupportedType(_) => "UnsupportedType",
            Self::ExtractionFailed(_) => "ExtractionFailed",
            Self::DecodeFailed(_) => "DecodeFailed",
            Self::EmbeddingFailed(_) => "EmbeddingFailed",
            Self::BackendUnavailable(_) => "BackendUnavailable",
            Self::DimensionMismatch(_) => "DimensionMismatch",
            Self::CacheUnavailable(_) => "CacheUnavailable",
            Self::StorageError(_) => "StorageError",
            Self::InvalidInput(_) => "InvalidInput",
            Self::Cancelled(_) => "Cancelled",
            Self::IoError(_) => "IoError",
            Self::Internal(_) => "Internal",
        }
    }
}
