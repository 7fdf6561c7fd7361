use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected at the boundary: blank names, non-positive cup volumes, bad hours...
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("record {0} not found")]
    NotFound(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to encode history: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("unable to read or write settings: {0}")]
    Settings(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether the failure came from storage rather than the caller's input.
    /// Storage failures may be retried by the user as-is.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Encoding(_) | Self::Settings(_))
    }
}
