use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidId(String),
    InvalidHash(String),
    InvalidByteSize(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidId(msg) => write!(f, "invalid video id: {msg}"),
            ModelError::InvalidHash(msg) => {
                write!(f, "invalid content hash: {msg}")
            }
            ModelError::InvalidByteSize(msg) => {
                write!(f, "invalid byte size: {msg}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
