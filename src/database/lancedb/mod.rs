// LanceDB vector database module
// Holds the vector column for fragments; all other metadata lives in SQLite

pub mod vector_store;

pub use vector_store::{VectorHit, VectorStore};

/// A fragment vector as stored in LanceDB. The id matches the fragment
/// row in SQLite.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub document_id: String,
    pub vector: Vec<f32>,
}
