use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Stable machine-readable kind, used by the tool dispatch surface.
    #[inline]
    pub fn kind(&self) -> &'static str {
        match *self {
            RagError::Configuration(_) => "configuration_error",
            RagError::InvalidInput(_) => "invalid_input",
            RagError::InvalidArgument(_) => "invalid_argument",
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::EmbeddingUnavailable(_) => "embedding_unavailable",
            RagError::Embedding(_) => "embedding_error",
            RagError::Ingestion(_) => "ingestion_failed",
            RagError::Database(_) => "database_error",
            RagError::Io(_) => "io_error",
            RagError::Other(_) => "internal_error",
        }
    }
}

pub mod chunker;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod pipeline;
pub mod tool;
