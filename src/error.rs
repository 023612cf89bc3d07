use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid state filter: {0}")]
    InvalidFilter(String),

    #[error("job not found in dead letter queue: {0}")]
    NotFound(String),

    #[error("store corrupt: {}: {source}", path.display())]
    StoreCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;
