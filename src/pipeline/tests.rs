use super::*;
use async_trait::async_trait;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tempfile::TempDir;

const DIM: usize = 64;

/// Deterministic embedder for tests: hashes character trigrams into a
/// fixed number of buckets and L2-normalizes. Identical texts produce
/// identical vectors and overlapping texts score in (0, 1].
struct TrigramEmbedder {
    dimension: usize,
}

impl TrigramEmbedder {
    fn embed_text(&self, text: &str) -> Vec<f32> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut vector = vec![0.0f32; self.dimension];

        if chars.len() < 3 {
            let mut hasher = DefaultHasher::new();
            chars.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimension] += 1.0;
        } else {
            for trigram in chars.windows(3) {
                let mut hasher = DefaultHasher::new();
                trigram.hash(&mut hasher);
                vector[(hasher.finish() as usize) % self.dimension] += 1.0;
            }
        }

        crate::embeddings::normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for TrigramEmbedder {
    async fn embed_batch(
        &self,
        texts: &[String],
        _role: EmbeddingRole,
    ) -> crate::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn health_check(&self) -> crate::Result<()> {
        Ok(())
    }
}

/// Embedder whose batches always fail, for exercising rollback paths
struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_batch(
        &self,
        _texts: &[String],
        _role: EmbeddingRole,
    ) -> crate::Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingUnavailable(
            "service is down".to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn health_check(&self) -> crate::Result<()> {
        Err(RagError::EmbeddingUnavailable(
            "service is down".to_string(),
        ))
    }
}

async fn test_pipeline(embedder: Arc<dyn Embedder>) -> (RagPipeline, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path(), DIM).await.unwrap();

    let retrieval = RetrievalConfig {
        top_k: 5,
        similarity_threshold: 0.0,
        max_context_length: 4000,
    };

    let pipeline =
        RagPipeline::new(embedder, store, ChunkingConfig::default(), retrieval).unwrap();
    (pipeline, dir)
}

async fn trigram_pipeline() -> (RagPipeline, TempDir) {
    test_pipeline(Arc::new(TrigramEmbedder { dimension: DIM })).await
}

fn ingest_request(text: &str, title: &str) -> IngestRequest {
    IngestRequest {
        text: text.to_string(),
        title: Some(title.to_string()),
        ..Default::default()
    }
}

fn query_request(query: &str) -> QueryRequest {
    QueryRequest {
        query: query.to_string(),
        include_metadata: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn empty_text_is_rejected() {
    let (pipeline, _dir) = trigram_pipeline().await;

    for text in ["", "   \n\t  "] {
        let err = pipeline
            .ingest(ingest_request(text, "Empty"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
    }
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let err = pipeline.query(query_request("  ")).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidInput(_)));
}

#[tokio::test]
async fn zero_top_k_is_rejected() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let mut request = query_request("anything");
    request.top_k = Some(0);
    let err = pipeline.query(request).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidArgument(_)));
}

#[tokio::test]
async fn korean_round_trip() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let receipt = pipeline
        .ingest(ingest_request(
            "인공지능(AI)은 컴퓨터가 인간의 지능을 모방하도록 만드는 기술이다. \
             기계 학습은 데이터로부터 패턴을 학습하는 인공지능의 한 분야이다.",
            "AI 기초 개념",
        ))
        .await
        .unwrap();
    assert!(receipt.fragment_count >= 1);

    let response = pipeline
        .query(query_request("인공지능이란 무엇인가?"))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    let top = &response.results[0];
    assert_eq!(top.document_title, "AI 기초 개념");
    // Slack above 1.0 for float error in the distance computation
    assert!(top.score > 0.0 && top.score <= 1.0001, "score was {}", top.score);

    assert!(response.context.contains("[Document 1] (from: AI 기초 개념):"));
    assert!(response.prompt.contains(&response.context));
    assert!(response.prompt.contains("인공지능이란 무엇인가?"));
    assert!(response.prompt.ends_with("Answer:"));
}

#[tokio::test]
async fn verbatim_text_scores_near_one() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let text = "The quick brown fox jumps over the lazy dog.";
    pipeline.ingest(ingest_request(text, "Foxes")).await.unwrap();

    let response = pipeline.query(query_request(text)).await.unwrap();
    assert!(!response.results.is_empty());
    assert!(
        response.results[0].score > 0.999,
        "score was {}",
        response.results[0].score
    );
}

#[tokio::test]
async fn unreachable_threshold_yields_empty_response() {
    let (pipeline, _dir) = trigram_pipeline().await;

    pipeline
        .ingest(ingest_request("some stored content", "Doc"))
        .await
        .unwrap();

    let mut request = query_request("some stored content");
    request.similarity_threshold = Some(1.01);
    let response = pipeline.query(request).await.unwrap();

    assert!(response.results.is_empty());
    assert!(response.context.is_empty());
    assert!(
        response
            .prompt
            .starts_with("Based on your knowledge, please answer the following question:")
    );
}

#[tokio::test]
async fn metadata_is_stripped_when_not_requested() {
    let (pipeline, _dir) = trigram_pipeline().await;

    pipeline
        .ingest(ingest_request("metadata handling content", "Doc"))
        .await
        .unwrap();

    let mut request = query_request("metadata handling content");
    request.include_metadata = false;
    let response = pipeline.query(request).await.unwrap();

    assert!(!response.results.is_empty());
    for hit in &response.results {
        assert_eq!(hit.metadata, json!({}));
    }
}

#[tokio::test]
async fn context_drops_lowest_ranked_fragments_whole() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path(), DIM).await.unwrap();
    let retrieval = RetrievalConfig {
        top_k: 5,
        similarity_threshold: 0.0,
        // Fits one block, not two
        max_context_length: 120,
    };
    let pipeline = RagPipeline::new(
        Arc::new(TrigramEmbedder { dimension: DIM }),
        store,
        ChunkingConfig::default(),
        retrieval,
    )
    .unwrap();

    pipeline
        .ingest(ingest_request(
            "alpha beta gamma delta epsilon zeta eta theta",
            "First",
        ))
        .await
        .unwrap();
    pipeline
        .ingest(ingest_request(
            "totally unrelated content about cooking pasta",
            "Second",
        ))
        .await
        .unwrap();

    let response = pipeline
        .query(query_request("alpha beta gamma delta"))
        .await
        .unwrap();

    // Both hits survive in results, only the best fits the context
    assert_eq!(response.results.len(), 2);
    assert!(response.context.contains("[Document 1]"));
    assert!(!response.context.contains("[Document 2]"));
    assert!(response.context.chars().count() <= 120);
}

#[tokio::test]
async fn failed_embedding_leaves_no_document_behind() {
    let (pipeline, _dir) = test_pipeline(Arc::new(FailingEmbedder)).await;

    let err = pipeline
        .ingest(ingest_request("content that will not embed", "Doc"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Ingestion(_)));
    assert!(err.to_string().contains("Doc"));

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.store.documents, 0);
    assert_eq!(stats.store.fragments, 0);
    assert_eq!(stats.store.vectors, 0);
    assert!(!stats.embedder_healthy);
}

#[tokio::test]
async fn reingest_with_same_id_replaces_document() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let mut first = ingest_request("original version of the text", "Doc v1");
    first.document_id = Some("doc-1".to_string());
    pipeline.ingest(first).await.unwrap();

    let mut second = ingest_request("revised version of the text", "Doc v2");
    second.document_id = Some("doc-1".to_string());
    pipeline.ingest(second).await.unwrap();

    let documents = pipeline.list_documents(10, 0).await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].title, "Doc v2");

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.store.documents, 1);
    assert_eq!(stats.store.fragments as usize, stats.store.vectors as usize);
}

#[tokio::test]
async fn chunking_method_override_is_applied() {
    let (pipeline, _dir) = trigram_pipeline().await;

    // No sentence endings, so the sentence strategy keeps this in one
    // chunk; token windows of the default size do too
    let text = "one two three four five six seven eight nine ten";

    let mut request = ingest_request(text, "Doc");
    request.chunking_method = Some(ChunkingMethod::Token);
    let receipt = pipeline.ingest(request).await.unwrap();
    assert_eq!(receipt.fragment_count, 1);

    let fragments = pipeline
        .store()
        .fragments_for_document(&receipt.document_id)
        .await
        .unwrap();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].content, text);
}

#[tokio::test]
async fn delete_document_flow() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let receipt = pipeline
        .ingest(ingest_request("short lived document", "Doc"))
        .await
        .unwrap();

    assert!(pipeline.delete_document(&receipt.document_id).await.unwrap());
    assert!(!pipeline.delete_document(&receipt.document_id).await.unwrap());

    let response = pipeline
        .query(query_request("short lived document"))
        .await
        .unwrap();
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn document_filter_restricts_query() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let mut first = ingest_request("shared subject matter here", "First");
    first.document_id = Some("doc-1".to_string());
    pipeline.ingest(first).await.unwrap();

    let mut second = ingest_request("shared subject matter here", "Second");
    second.document_id = Some("doc-2".to_string());
    pipeline.ingest(second).await.unwrap();

    let mut request = query_request("shared subject matter");
    request.document_ids = Some(vec!["doc-2".to_string()]);
    let response = pipeline.query(request).await.unwrap();

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].document_id, "doc-2");
}

#[tokio::test]
async fn batch_ingest_records_failures_in_place() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let outcomes = pipeline
        .ingest_batch(vec![
            ingest_request("first document body", "First"),
            ingest_request("   ", "Empty"),
            ingest_request("third document body", "Third"),
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert!(matches!(outcomes[1], Err(RagError::InvalidInput(_))));
    assert!(outcomes[2].is_ok());

    // The failed document did not block the rest of the batch
    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.store.documents, 2);
}

#[tokio::test]
async fn document_info_reports_fragment_count() {
    let (pipeline, _dir) = trigram_pipeline().await;

    let receipt = pipeline
        .ingest(ingest_request(
            "A first sentence about storage. A second sentence about retrieval.",
            "Doc",
        ))
        .await
        .unwrap();

    let info = pipeline
        .document_info(&receipt.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.document.title, "Doc");
    assert_eq!(info.fragment_count, receipt.fragment_count);

    assert!(pipeline.document_info("no-such-id").await.unwrap().is_none());
}

#[tokio::test]
async fn mismatched_dimensions_are_rejected_at_construction() {
    let dir = TempDir::new().unwrap();
    let store = DocumentStore::open(dir.path(), DIM).await.unwrap();

    let err = RagPipeline::new(
        Arc::new(TrigramEmbedder { dimension: DIM / 2 }),
        store,
        ChunkingConfig::default(),
        RetrievalConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { .. }));
}
