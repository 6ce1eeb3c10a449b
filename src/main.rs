use anyhow::Result;
use clap::{Parser, Subcommand};
use ragkit::chunker::ChunkingMethod;
use ragkit::commands::{
    delete_document, ingest_document, list_documents, query_documents, run_tool, show_stats,
};
use ragkit::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragkit")]
#[command(about = "A retrieval-augmented generation pipeline over local documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure embedding service and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a document into the knowledge base
    Ingest {
        /// File to ingest; reads stdin when omitted
        file: Option<PathBuf>,
        /// Title for the document
        #[arg(long)]
        title: Option<String>,
        /// Source label, defaults to the file path
        #[arg(long)]
        source: Option<String>,
        /// Language code, e.g. "en" or "ko"
        #[arg(long)]
        language: Option<String>,
        /// Explicit document id; re-ingesting with the same id replaces the document
        #[arg(long)]
        id: Option<String>,
        /// Chunking method: sentence, token, or paragraph
        #[arg(long)]
        method: Option<ChunkingMethod>,
    },
    /// Search the knowledge base
    Query {
        /// The question to ask
        query: String,
        /// Maximum number of fragments to retrieve
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum similarity score for results
        #[arg(long)]
        threshold: Option<f32>,
        /// Print the assembled grounding prompt
        #[arg(long)]
        prompt: bool,
    },
    /// List ingested documents
    List {
        /// Maximum number of documents to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Number of documents to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Delete a document and its fragments
    Delete {
        /// Document id to delete
        id: String,
    },
    /// Show knowledge base statistics
    Stats,
    /// Run a raw JSON tool invocation
    Tool {
        /// JSON object with an "action" key and its parameters
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest {
            file,
            title,
            source,
            language,
            id,
            method,
        } => {
            ingest_document(file, title, source, language, id, method).await?;
        }
        Commands::Query {
            query,
            top_k,
            threshold,
            prompt,
        } => {
            query_documents(query, top_k, threshold, prompt).await?;
        }
        Commands::List { limit, offset } => {
            list_documents(limit, offset).await?;
        }
        Commands::Delete { id } => {
            delete_document(id).await?;
        }
        Commands::Stats => {
            show_stats().await?;
        }
        Commands::Tool { input } => {
            run_tool(input).await?;
        }
    }

    Ok(())
}
