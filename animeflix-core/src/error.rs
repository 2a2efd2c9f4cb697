use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Range not satisfiable: {0}")]
    InvalidRange(String),

    #[error("Storage full: {0}")]
    StorageFull(String),

    #[error("Corrupt index {path}: {reason}")]
    CorruptIndex { path: String, reason: String },

    #[error("Refusing to store empty content")]
    EmptyContent,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Internal(format!("blocking task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
