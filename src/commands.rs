use anyhow::{Context, Result};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::chunker::ChunkingMethod;
use crate::config::Config;
use crate::database::DocumentStore;
use crate::embeddings::{Embedder, EmbeddingClient};
use crate::pipeline::{IngestRequest, QueryRequest, RagPipeline};
use crate::tool;

async fn build_pipeline() -> Result<RagPipeline> {
    let config = Config::load().context("Failed to load configuration")?;

    let dimension = config.embedding.dimension as usize;
    let store = DocumentStore::open(&config.base_dir, dimension)
        .await
        .context("Failed to open document store")?;
    let embedder: Arc<dyn Embedder> = Arc::new(
        EmbeddingClient::new(&config.embedding).context("Failed to create embedding client")?,
    );

    let pipeline = RagPipeline::new(embedder, store, config.chunking, config.retrieval)?;
    Ok(pipeline)
}

/// Ingest a document from a file, or from stdin when no file is given
#[inline]
pub async fn ingest_document(
    file: Option<PathBuf>,
    title: Option<String>,
    source: Option<String>,
    language: Option<String>,
    document_id: Option<String>,
    chunking_method: Option<ChunkingMethod>,
) -> Result<()> {
    let (text, derived_title, derived_source) = match file {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            let derived_title = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
            (text, derived_title, Some(path.display().to_string()))
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read from stdin")?;
            (text, None, None)
        }
    };

    let pipeline = build_pipeline().await?;

    info!("Ingesting document from CLI");
    let receipt = pipeline
        .ingest(IngestRequest {
            text,
            document_id,
            title: title.or(derived_title),
            source: source.or(derived_source),
            language,
            metadata: None,
            chunking_method,
        })
        .await?;

    println!("Ingested document: {}", receipt.document_id);
    println!("  Fragments: {}", receipt.fragment_count);

    Ok(())
}

/// Query the knowledge base and print the retrieved fragments
#[inline]
pub async fn query_documents(
    query: String,
    top_k: Option<usize>,
    similarity_threshold: Option<f32>,
    show_prompt: bool,
) -> Result<()> {
    let pipeline = build_pipeline().await?;

    let response = pipeline
        .query(QueryRequest {
            query,
            top_k,
            similarity_threshold,
            document_ids: None,
            include_metadata: true,
        })
        .await?;

    if response.results.is_empty() {
        println!("No matching fragments found.");
    } else {
        println!("Found {} matching fragments:", response.results.len());
        println!();

        for (position, hit) in response.results.iter().enumerate() {
            println!(
                "{}. {} (score: {:.4})",
                position + 1,
                hit.document_title,
                hit.score
            );
            println!("   Document: {}", hit.document_id);
            println!("   Fragment: {} (ordinal {})", hit.fragment_id, hit.ordinal);
            println!("   {}", hit.content.trim());
            println!();
        }
    }

    if show_prompt {
        println!("--- Prompt ---");
        println!("{}", response.prompt);
    }

    Ok(())
}

/// List committed documents
#[inline]
pub async fn list_documents(limit: usize, offset: usize) -> Result<()> {
    let pipeline = build_pipeline().await?;
    let documents = pipeline.list_documents(limit, offset).await?;

    if documents.is_empty() {
        println!("No documents have been ingested yet.");
        println!("Use 'ragkit ingest <file>' to add a document.");
        return Ok(());
    }

    println!("Documents ({} shown):", documents.len());
    println!();

    for document in &documents {
        println!("{} (ID: {})", document.title, document.id);
        if let Some(source) = &document.source {
            println!("   Source: {source}");
        }
        if let Some(language) = &document.language {
            println!("   Language: {language}");
        }
        println!(
            "   Created: {}",
            document.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}

/// Delete a document and all of its fragments
#[inline]
pub async fn delete_document(document_id: String) -> Result<()> {
    let pipeline = build_pipeline().await?;

    if pipeline.delete_document(&document_id).await? {
        println!("Deleted document: {document_id}");
    } else {
        println!("Document not found: {document_id}");
    }

    Ok(())
}

/// Show store statistics, embedder health, and cross-store consistency
#[inline]
pub async fn show_stats() -> Result<()> {
    let pipeline = build_pipeline().await?;

    let stats = pipeline.stats().await?;
    println!("Knowledge Base Statistics");
    println!("  Documents: {}", stats.store.documents);
    println!("  Fragments: {}", stats.store.fragments);
    println!("  Vectors:   {}", stats.store.vectors);
    println!("  Dimension: {}", stats.store.dimension);
    println!(
        "  Embedding service: {}",
        if stats.embedder_healthy {
            "healthy"
        } else {
            "unreachable"
        }
    );

    println!();
    println!("Consistency:");
    let report = pipeline.store().verify_consistency().await?;
    if report.is_consistent() {
        println!("  Stores are consistent");
    } else {
        if !report.orphaned_vectors.is_empty() {
            println!("  Orphaned vectors: {}", report.orphaned_vectors.len());
        }
        if !report.missing_vectors.is_empty() {
            println!("  Missing vectors: {}", report.missing_vectors.len());
        }
    }

    Ok(())
}

/// Run a raw JSON tool invocation and print the JSON response
#[inline]
pub async fn run_tool(input: String) -> Result<()> {
    let value: Value = serde_json::from_str(&input).context("Tool input is not valid JSON")?;

    let pipeline = build_pipeline().await?;
    let response = tool::dispatch(&pipeline, value).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
