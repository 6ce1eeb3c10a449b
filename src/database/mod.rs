// Database module
// Dual database system: SQLite for document/fragment metadata, LanceDB
// for the vector column

pub mod lancedb;
pub mod sqlite;


pub use lancedb::{VectorHit, VectorRecord, VectorStore};
pub use sqlite::models::{Document, DocumentStatus, Fragment, NewDocument, NewFragment};

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{RagError, Result};
use sqlite::Database;
use sqlite::queries::{DocumentQueries, FragmentQueries};

/// Candidates fetched from the vector index per requested result, so
/// post-filtering against staged documents and the similarity threshold
/// still leaves enough hits.
const SEARCH_OVERFETCH: usize = 4;

/// A chunk with its embedding, ready for storage
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFragment {
    pub content: String,
    pub ordinal: i64,
    pub token_count: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub metadata: Value,
    pub vector: Vec<f32>,
}

/// A search result: a committed fragment with its similarity score
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub fragment_id: String,
    pub document_id: String,
    pub document_title: String,
    pub content: String,
    pub ordinal: i64,
    pub token_count: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub metadata: Value,
    pub score: f32,
    #[serde(skip)]
    pub document_created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: u64,
    pub fragments: u64,
    pub vectors: u64,
    pub dimension: usize,
}

/// Cross-store consistency report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Vector ids with no fragment row at all
    pub orphaned_vectors: Vec<String>,
    /// Committed fragments with no vector
    pub missing_vectors: Vec<String>,
}

impl ConsistencyReport {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.orphaned_vectors.is_empty() && self.missing_vectors.is_empty()
    }
}

/// Facade over the SQLite metadata store and the LanceDB vector store.
///
/// Ingestion is staged: a document's fragments and vectors become
/// visible to search only after the fragment transaction commits and
/// flips the document to `committed`. Cheap to clone; both underlying
/// connections are internally reference-counted.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    db: Database,
    vectors: VectorStore,
    dimension: usize,
}

impl DocumentStore {
    /// Open (or create) both stores under `base_dir`
    #[inline]
    pub async fn open(base_dir: &Path, dimension: usize) -> Result<Self> {
        let db = Database::initialize_from_base_dir(base_dir).await?;
        let vectors = VectorStore::open(&base_dir.join("vectors"), dimension).await?;

        Ok(Self {
            db,
            vectors,
            dimension,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Create or replace a document in the staged state. Idempotent on
    /// explicit ids.
    #[inline]
    pub async fn upsert_document(&self, new_document: NewDocument) -> Result<Document> {
        Ok(DocumentQueries::upsert(self.db.pool(), new_document).await?)
    }

    #[inline]
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(DocumentQueries::get_by_id(self.db.pool(), id).await?)
    }

    /// Store a document's fragments and vectors, then commit the
    /// document, all-or-nothing.
    ///
    /// Vectors land in LanceDB first, but the document stays staged
    /// until the single SQLite transaction that writes the fragment
    /// rows also flips the status, so readers never observe a partial
    /// document. Any failure rolls the vectors back out.
    #[inline]
    pub async fn insert_fragments(
        &self,
        document_id: &str,
        fragments: Vec<EmbeddedFragment>,
    ) -> Result<usize> {
        for fragment in &fragments {
            if fragment.vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: fragment.vector.len(),
                });
            }
        }

        debug!(
            "Inserting {} fragments for document {}",
            fragments.len(),
            document_id
        );

        let mut records = Vec::with_capacity(fragments.len());
        let mut rows = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let id = Uuid::new_v4().to_string();
            records.push(VectorRecord {
                id: id.clone(),
                document_id: document_id.to_string(),
                vector: fragment.vector,
            });
            rows.push(NewFragment {
                id,
                document_id: document_id.to_string(),
                content: fragment.content,
                ordinal: fragment.ordinal,
                token_count: fragment.token_count,
                start_offset: fragment.start_offset,
                end_offset: fragment.end_offset,
                metadata: fragment.metadata,
            });
        }

        // Clear vectors from any previous version of this document
        self.vectors.delete_document(document_id).await?;
        self.vectors.store(records).await?;

        match self.commit_fragments(document_id, rows).await {
            Ok(count) => {
                info!(
                    "Committed document {} with {} fragments",
                    document_id, count
                );
                Ok(count)
            }
            Err(error) => {
                warn!(
                    "Fragment commit failed for document {}, removing staged vectors",
                    document_id
                );
                if let Err(cleanup_error) = self.vectors.delete_document(document_id).await {
                    warn!(
                        "Failed to clean up staged vectors for document {}: {}",
                        document_id, cleanup_error
                    );
                }
                Err(error)
            }
        }
    }

    async fn commit_fragments(&self, document_id: &str, rows: Vec<NewFragment>) -> Result<usize> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| RagError::Database(format!("Failed to begin transaction: {e}")))?;

        FragmentQueries::delete_for_document(&mut tx, document_id).await?;
        let count = FragmentQueries::create_batch(&mut tx, rows).await?;
        DocumentQueries::set_status(&mut tx, document_id, DocumentStatus::Committed).await?;

        tx.commit()
            .await
            .map_err(|e| RagError::Database(format!("Failed to commit transaction: {e}")))?;

        Ok(count)
    }

    /// Remove everything belonging to a staged document after a failed
    /// ingestion. Safe to call even if nothing was written yet.
    #[inline]
    pub async fn rollback_staged(&self, document_id: &str) -> Result<()> {
        debug!("Rolling back staged document {}", document_id);
        self.vectors.delete_document(document_id).await?;
        DocumentQueries::delete(self.db.pool(), document_id).await?;
        Ok(())
    }

    /// Similarity search over committed fragments.
    ///
    /// Results are filtered to `score >= threshold` and ordered by
    /// score descending, then fragment ordinal, then document age; at
    /// most `k` are returned. An empty result is not an error.
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        threshold: f32,
        document_filter: Option<&[String]>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(RagError::InvalidArgument(
                "k must be greater than zero".to_string(),
            ));
        }
        if query_vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let limit = k.saturating_mul(SEARCH_OVERFETCH);
        let vector_hits = self
            .vectors
            .search(query_vector, limit, document_filter)
            .await?;
        if vector_hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = vector_hits.iter().map(|h| h.id.clone()).collect();
        let scores: HashMap<&str, f32> = vector_hits
            .iter()
            .map(|h| (h.id.as_str(), h.score))
            .collect();

        let rows = FragmentQueries::committed_hits(self.db.pool(), &ids).await?;

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter_map(|row| {
                let score = *scores.get(row.id.as_str())?;
                (score >= threshold).then(|| SearchHit {
                    fragment_id: row.id,
                    document_id: row.document_id,
                    document_title: row.document_title,
                    content: row.content,
                    ordinal: row.ordinal,
                    token_count: row.token_count,
                    start_offset: row.start_offset,
                    end_offset: row.end_offset,
                    metadata: serde_json::from_str(&row.metadata)
                        .unwrap_or_else(|_| Value::Object(Default::default())),
                    score,
                    document_created_at: row.document_created_at,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.ordinal.cmp(&b.ordinal))
                .then_with(|| a.document_created_at.cmp(&b.document_created_at))
        });
        hits.truncate(k);

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Delete a document and everything attached to it. Returns whether
    /// a document row existed. Idempotent.
    #[inline]
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let deleted = DocumentQueries::delete(self.db.pool(), id).await?;
        self.vectors.delete_document(id).await?;

        if deleted {
            info!("Deleted document {}", id);
        }
        Ok(deleted)
    }

    /// List committed documents, newest first
    #[inline]
    pub async fn list_documents(&self, limit: usize, offset: usize) -> Result<Vec<Document>> {
        Ok(DocumentQueries::list_committed(self.db.pool(), limit as i64, offset as i64).await?)
    }

    #[inline]
    pub async fn fragments_for_document(&self, document_id: &str) -> Result<Vec<Fragment>> {
        Ok(FragmentQueries::list_by_document(self.db.pool(), document_id).await?)
    }

    #[inline]
    pub async fn stats(&self) -> Result<StoreStats> {
        let documents =
            DocumentQueries::count_by_status(self.db.pool(), DocumentStatus::Committed).await?;
        let fragments = FragmentQueries::count_committed(self.db.pool()).await?;
        let vectors = self.vectors.count().await?;

        Ok(StoreStats {
            documents: documents as u64,
            fragments: fragments as u64,
            vectors,
            dimension: self.dimension,
        })
    }

    /// Cross-check the two stores for orphaned or missing vectors
    #[inline]
    pub async fn verify_consistency(&self) -> Result<ConsistencyReport> {
        let vector_ids: HashSet<String> = self.vectors.list_ids().await?.into_iter().collect();
        let all_fragment_ids: HashSet<String> =
            FragmentQueries::all_ids(self.db.pool()).await?.into_iter().collect();
        let committed_ids = FragmentQueries::committed_ids(self.db.pool()).await?;

        let mut orphaned_vectors: Vec<String> = vector_ids
            .difference(&all_fragment_ids)
            .cloned()
            .collect();
        orphaned_vectors.sort();

        let mut missing_vectors: Vec<String> = committed_ids
            .into_iter()
            .filter(|id| !vector_ids.contains(id))
            .collect();
        missing_vectors.sort();

        Ok(ConsistencyReport {
            orphaned_vectors,
            missing_vectors,
        })
    }

    /// Compact both stores and refresh the ANN index
    #[inline]
    pub async fn optimize(&self) -> Result<()> {
        self.db.optimize().await?;
        self.vectors.optimize().await?;
        Ok(())
    }

    #[inline]
    pub async fn create_vector_index(&self) -> Result<()> {
        self.vectors.create_vector_index().await
    }
}
