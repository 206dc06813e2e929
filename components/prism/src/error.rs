use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::ShardVariant;

#[derive(Debug, Error)]
pub enum PrismError {
    #[error("{variant} corpus already exists at '{}'", path.display())]
    Conflict { variant: ShardVariant, path: PathBuf },

    #[error("no {variant} corpus found at '{}'", path.display())]
    NotFound { variant: ShardVariant, path: PathBuf },

    #[error("invalid partitioning request: {0}")]
    Validation(String),

    #[error("I/O error during {operation} on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// Creation stopped part way; the named chunk was not written.
    #[error("failed to create chunk {index} ('{}'): {source}", path.display())]
    Chunk {
        index: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid subcorpus descriptor: {0}")]
    Descriptor(String),
}

impl PrismError {
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: io::Error) -> Self {
        PrismError::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrismError>;
