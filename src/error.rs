use std::path::PathBuf;

use thiserror::Error;

use crate::generation::GenerationError;
use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum NavigatorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cache corruption at {}: {reason}", path.display())]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("identifier '{identifier}' is not present in the detail table")]
    RetrievalLookup { identifier: String },

    #[error("{stage} stage failed: {source}")]
    Generation {
        stage: Stage,
        #[source]
        source: GenerationError,
    },

    #[error("embedding failed: {0}")]
    Embedding(#[source] GenerationError),

    #[error("index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NavigatorResult<T> = Result<T, NavigatorError>;

impl NavigatorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn generation(stage: Stage, source: GenerationError) -> Self {
        Self::Generation { stage, source }
    }
}
