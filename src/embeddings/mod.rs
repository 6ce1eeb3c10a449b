// Embedding generation module
// Defines the embedding abstraction and the HTTP client implementation

pub mod client;

pub use client::EmbeddingClient;

use async_trait::async_trait;

use crate::Result;

/// Whether a text is embedded as a search query or as stored document
/// content.
///
/// Asymmetric models score query-vs-passage pairs, so the two sides get
/// different instruction prefixes and must never be mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingRole {
    Query,
    Document,
}

impl EmbeddingRole {
    /// Instruction prefix prepended to the text before embedding
    /// (the e5 model family convention).
    #[inline]
    pub fn prefix(self) -> &'static str {
        match self {
            EmbeddingRole::Query => "query: ",
            EmbeddingRole::Document => "passage: ",
        }
    }

    /// Prepend the role prefix to a text
    #[inline]
    pub fn apply(self, text: &str) -> String {
        format!("{}{}", self.prefix(), text)
    }
}

/// Embedding backend abstraction.
///
/// The pipeline holds this behind an `Arc<dyn Embedder>`, so tests can
/// substitute a deterministic in-process implementation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts under the given role, preserving input
    /// order. Every returned vector has `dimension()` entries and unit
    /// L2 norm.
    async fn embed_batch(&self, texts: &[String], role: EmbeddingRole) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_one(&self, text: &str, role: EmbeddingRole) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()], role).await?;
        vectors.pop().ok_or_else(|| {
            crate::RagError::Embedding("Embedding backend returned no vector".to_string())
        })
    }

    /// Dimensionality of the vectors this embedder produces
    fn dimension(&self) -> usize;

    /// Verify the backend is reachable and serving the expected model
    async fn health_check(&self) -> Result<()>;
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left
/// untouched.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
