// RAG pipeline orchestrator
// Ties the chunker, the embedding client, and the document store
// together into ingest and query flows

#[cfg(test)]
mod tests;

use crate::chunker::{self, ChunkingConfig, ChunkingMethod};
use crate::config::RetrievalConfig;
use crate::database::{
    Document, DocumentStore, EmbeddedFragment, NewDocument, SearchHit, StoreStats,
};
use crate::embeddings::{Embedder, EmbeddingRole};
use crate::{RagError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A document to be chunked, embedded, and stored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    /// Re-ingesting with the same id replaces the previous version
    pub document_id: Option<String>,
    pub title: Option<String>,
    pub source: Option<String>,
    pub language: Option<String>,
    pub metadata: Option<Value>,
    /// Overrides the configured chunking method for this document
    pub chunking_method: Option<ChunkingMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub fragment_count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f32>,
    /// Restrict the search to these documents
    pub document_ids: Option<Vec<String>>,
    #[serde(default = "default_include_metadata")]
    pub include_metadata: bool,
}

fn default_include_metadata() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub query: String,
    /// The assembled context blocks, bounded by `max_context_length`
    pub context: String,
    /// The full grounding prompt ready to hand to a language model
    pub prompt: String,
    pub results: Vec<SearchHit>,
}

/// A stored document together with its fragment count
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    #[serde(flatten)]
    pub document: Document,
    pub fragment_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub embedder_healthy: bool,
}

/// The RAG orchestrator.
///
/// Cheap to clone; the store and the embedder are shared.
#[derive(Clone)]
pub struct RagPipeline {
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
    embedder: Arc<dyn Embedder>,
    store: DocumentStore,
}

// Manual impl: `dyn Embedder` does not implement `Debug`.
impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("chunking", &self.chunking)
            .field("retrieval", &self.retrieval)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Build a pipeline from validated configuration. The embedder and
    /// the store must agree on the vector dimension.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: DocumentStore,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
    ) -> Result<Self> {
        chunking.validate()?;
        retrieval.validate()?;

        if embedder.dimension() != store.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            });
        }

        Ok(Self {
            chunking,
            retrieval,
            embedder,
            store,
        })
    }

    #[inline]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Chunk, embed, and store a document.
    ///
    /// The document becomes visible to search only once every fragment
    /// has been committed; a failure part-way through removes the
    /// staged document again, so a retry with the same request is safe.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt> {
        if request.text.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "document text must not be empty".to_string(),
            ));
        }

        let mut chunking = self.chunking.clone();
        if let Some(method) = request.chunking_method {
            chunking.method = method;
        }

        let title = request.title.unwrap_or_else(|| "Untitled".to_string());
        info!("Ingesting document '{}' with {} chunking", title, chunking.method);

        let chunks = chunker::chunk(&request.text, &chunking)?;
        debug!("Document '{}' produced {} chunks", title, chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts, EmbeddingRole::Document)
            .await
            .map_err(|error| {
                RagError::Ingestion(format!(
                    "Failed to embed fragments for document '{title}': {error}"
                ))
            })?;

        let document = self
            .store
            .upsert_document(NewDocument {
                id: request.document_id,
                title: title.clone(),
                source: request.source,
                language: request.language,
                metadata: request
                    .metadata
                    .unwrap_or_else(|| Value::Object(Default::default())),
            })
            .await?;

        let fragments: Vec<EmbeddedFragment> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedFragment {
                content: chunk.text,
                ordinal: chunk.chunk_index as i64,
                token_count: chunk.token_count as i64,
                start_offset: chunk.start_index as i64,
                end_offset: chunk.end_index as i64,
                metadata: Value::Object(Default::default()),
                vector,
            })
            .collect();

        match self.store.insert_fragments(&document.id, fragments).await {
            Ok(fragment_count) => {
                info!(
                    "Ingested document '{}' ({}) with {} fragments",
                    title, document.id, fragment_count
                );
                Ok(IngestReceipt {
                    document_id: document.id,
                    fragment_count,
                })
            }
            Err(error) => {
                warn!(
                    "Ingestion of document '{}' ({}) failed, rolling back",
                    title, document.id
                );
                if let Err(cleanup_error) = self.store.rollback_staged(&document.id).await {
                    warn!(
                        "Rollback of staged document {} failed: {}",
                        document.id, cleanup_error
                    );
                }
                Err(RagError::Ingestion(format!(
                    "Failed to store fragments for document {}: {error}",
                    document.id
                )))
            }
        }
    }

    /// Ingest several documents in order.
    ///
    /// Each document commits or rolls back on its own; a failure is
    /// recorded in place and does not stop the rest of the batch.
    pub async fn ingest_batch(
        &self,
        requests: Vec<IngestRequest>,
    ) -> Vec<Result<IngestReceipt>> {
        let total = requests.len();
        info!("Starting batch ingestion of {} documents", total);

        let mut outcomes = Vec::with_capacity(total);
        for (index, request) in requests.into_iter().enumerate() {
            let outcome = self.ingest(request).await;
            if let Err(error) = &outcome {
                warn!(
                    "Document {}/{} failed to ingest: {}",
                    index + 1,
                    total,
                    error
                );
            }
            outcomes.push(outcome);
        }

        let successful = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(
            "Batch ingestion completed: {}/{} successful",
            successful, total
        );
        outcomes
    }

    /// Embed the query, search the store, and assemble a grounding
    /// prompt from the results.
    ///
    /// Zero results is not an error; the prompt falls back to an
    /// ungrounded form and the context is empty.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        if request.query.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }

        let top_k = request.top_k.unwrap_or(self.retrieval.top_k);
        if top_k == 0 {
            return Err(RagError::InvalidArgument(
                "top_k must be greater than zero".to_string(),
            ));
        }
        let threshold = request
            .similarity_threshold
            .unwrap_or(self.retrieval.similarity_threshold);

        debug!(
            "Processing query (top_k: {}, threshold: {})",
            top_k, threshold
        );

        let query_vector = self
            .embedder
            .embed_one(&request.query, EmbeddingRole::Query)
            .await?;

        let mut results = self
            .store
            .search(
                &query_vector,
                top_k,
                threshold,
                request.document_ids.as_deref(),
            )
            .await?;

        let context = assemble_context(&results, self.retrieval.max_context_length);
        let prompt = build_prompt(&request.query, &context);

        if !request.include_metadata {
            for hit in &mut results {
                hit.metadata = Value::Object(Default::default());
            }
        }

        info!("Query returned {} results", results.len());

        Ok(QueryResponse {
            query: request.query,
            context,
            prompt,
            results,
        })
    }

    /// Remove a document and its fragments. Returns whether it existed.
    #[inline]
    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        self.store.delete_document(document_id).await
    }

    #[inline]
    pub async fn list_documents(&self, limit: usize, offset: usize) -> Result<Vec<Document>> {
        self.store.list_documents(limit, offset).await
    }

    /// Look up a document together with its fragment count
    pub async fn document_info(&self, document_id: &str) -> Result<Option<DocumentInfo>> {
        let Some(document) = self.store.get_document(document_id).await? else {
            debug!("Document not found: {}", document_id);
            return Ok(None);
        };

        let fragments = self.store.fragments_for_document(document_id).await?;
        Ok(Some(DocumentInfo {
            document,
            fragment_count: fragments.len(),
        }))
    }

    #[inline]
    pub async fn stats(&self) -> Result<PipelineStats> {
        let store = self.store.stats().await?;
        let embedder_healthy = self.embedder.health_check().await.is_ok();

        Ok(PipelineStats {
            store,
            embedder_healthy,
        })
    }
}

/// Join result fragments into numbered context blocks, dropping
/// lowest-ranked fragments once the character budget is exhausted.
/// Fragments are never cut mid-text.
fn assemble_context(results: &[SearchHit], max_context_length: usize) -> String {
    let mut blocks = Vec::new();
    let mut used = 0;

    for (position, hit) in results.iter().enumerate() {
        let block = format!(
            "[Document {}] (from: {}):\n{}\n",
            position + 1,
            hit.document_title,
            hit.content.trim()
        );

        // The separating newline counts against the budget too
        let cost = block.chars().count() + usize::from(!blocks.is_empty());
        if used + cost > max_context_length {
            debug!(
                "Context budget reached, including {}/{} fragments",
                blocks.len(),
                results.len()
            );
            break;
        }

        used += cost;
        blocks.push(block);
    }

    blocks.join("\n")
}

fn build_prompt(query: &str, context: &str) -> String {
    if context.is_empty() {
        return format!(
            "Based on your knowledge, please answer the following question:\n\n{query}"
        );
    }

    format!(
        "You are an assistant with access to the following knowledge base:\n\n\
         {context}\n\n\
         Based on the above information, please answer the following question. \
         If the answer cannot be found in the provided context, please indicate \
         that clearly.\n\n\
         Question: {query}\n\n\
         Answer:"
    )
}
