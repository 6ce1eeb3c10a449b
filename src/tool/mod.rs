// JSON tool dispatch surface
// A single action-keyed entry point over the RAG pipeline, meant to be
// wired into an agent tool or exercised from the CLI


use crate::RagError;
use crate::pipeline::{IngestRequest, QueryRequest, RagPipeline};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

const AVAILABLE_ACTIONS: [&str; 4] = ["ingest", "query", "list", "stats"];

#[derive(Debug, Clone, Deserialize)]
struct ListParams {
    #[serde(default = "default_list_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_list_limit() -> usize {
    10
}

/// Dispatch a JSON tool invocation against the pipeline.
///
/// The input object selects an operation through its `"action"` key
/// (defaulting to `"query"`); the remaining keys are the parameters of
/// that operation. Failures come back as a JSON error object rather
/// than an `Err`, so the caller can always relay the value verbatim.
pub async fn dispatch(pipeline: &RagPipeline, input: Value) -> Value {
    let action = input
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("query")
        .to_string();

    debug!("Dispatching tool action: {}", action);

    let result = match action.as_str() {
        "ingest" => handle_ingest(pipeline, input).await,
        "query" => handle_query(pipeline, input).await,
        "list" => handle_list(pipeline, input).await,
        "stats" => handle_stats(pipeline).await,
        other => {
            return json!({
                "error": {
                    "error_kind": "invalid_argument",
                    "message": format!("Unknown action: {other}"),
                },
                "available_actions": AVAILABLE_ACTIONS,
            });
        }
    };

    result.unwrap_or_else(|error| {
        warn!("Tool action '{}' failed: {}", action, error);
        json!({
            "error": {
                "error_kind": error.kind(),
                "message": error.to_string(),
            }
        })
    })
}

fn parse_params<T: for<'de> Deserialize<'de>>(input: Value) -> crate::Result<T> {
    serde_json::from_value(input)
        .map_err(|e| RagError::InvalidInput(format!("Invalid parameters: {e}")))
}

async fn handle_ingest(pipeline: &RagPipeline, input: Value) -> crate::Result<Value> {
    let request: IngestRequest = parse_params(input)?;
    let title = request
        .title
        .clone()
        .unwrap_or_else(|| "Untitled".to_string());

    let receipt = pipeline.ingest(request).await?;

    Ok(json!({
        "success": true,
        "document_id": receipt.document_id,
        "fragment_count": receipt.fragment_count,
        "message": format!("Successfully ingested document: {title}"),
    }))
}

async fn handle_query(pipeline: &RagPipeline, input: Value) -> crate::Result<Value> {
    let request: QueryRequest = parse_params(input)?;
    let response = pipeline.query(request).await?;
    let result_count = response.results.len();

    Ok(json!({
        "success": true,
        "query": response.query,
        "prompt": response.prompt,
        "context": response.context,
        "results": response.results,
        "result_count": result_count,
    }))
}

async fn handle_list(pipeline: &RagPipeline, input: Value) -> crate::Result<Value> {
    let params: ListParams = parse_params(input)?;
    let documents = pipeline.list_documents(params.limit, params.offset).await?;

    Ok(json!({
        "success": true,
        "count": documents.len(),
        "documents": documents,
        "limit": params.limit,
        "offset": params.offset,
    }))
}

async fn handle_stats(pipeline: &RagPipeline) -> crate::Result<Value> {
    let stats = pipeline.stats().await?;

    Ok(json!({
        "success": true,
        "stats": stats,
    }))
}
