use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use doc_rag::chunking::{self, Chunk, TextSplitter};
use doc_rag::embeddings::{EmbeddedChunk, EmbeddingsClient, EmbeddingsConfig};
use doc_rag::index::{QdrantConfig, QdrantIndex};
use doc_rag::ingest;
use doc_rag::llm::{ChatClient, ChatConfig};
use doc_rag::rag::RagEngine;
use doc_rag::server;

/// A RAG (Retrieval-Augmented Generation) pipeline over a folder of documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split the documents in a folder into overlapping chunks
    Chunk {
        /// Folder holding .pdf, .docx and .txt files
        #[arg(long, default_value = ingest::DEFAULT_INPUT_DIR)]
        input: PathBuf,
        /// Where to write the chunk list
        #[arg(long, default_value = ingest::DEFAULT_CHUNKS_FILE)]
        output: PathBuf,
        /// Maximum characters per chunk
        #[arg(long, default_value_t = chunking::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Characters shared by consecutive chunks
        #[arg(long, default_value_t = chunking::DEFAULT_CHUNK_OVERLAP)]
        chunk_overlap: usize,
    },
    /// Compute an embedding for every chunk
    Embed {
        /// Chunk list produced by the chunk stage
        #[arg(long, default_value = ingest::DEFAULT_CHUNKS_FILE)]
        input: PathBuf,
        /// Where to write the embedded chunks
        #[arg(long, default_value = ingest::DEFAULT_EMBEDDINGS_FILE)]
        output: PathBuf,
    },
    /// Upload embedded chunks into the vector index
    Upload {
        /// Embedded chunks produced by the embed stage
        #[arg(long, default_value = ingest::DEFAULT_EMBEDDINGS_FILE)]
        input: PathBuf,
    },
    /// Run chunk, embed and upload in one go
    Ingest {
        /// Folder holding .pdf, .docx and .txt files
        #[arg(long, default_value = ingest::DEFAULT_INPUT_DIR)]
        input: PathBuf,
        /// Maximum characters per chunk
        #[arg(long, default_value_t = chunking::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Characters shared by consecutive chunks
        #[arg(long, default_value_t = chunking::DEFAULT_CHUNK_OVERLAP)]
        chunk_overlap: usize,
    },
    /// Ask a question against the index
    Ask {
        /// The question; omit it for an interactive session
        question: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

/// Construct the query-side clients once, from validated configuration.
fn build_engine() -> Result<RagEngine> {
    let embedder = EmbeddingsClient::new(
        EmbeddingsConfig::from_env().context("Incomplete embeddings configuration")?,
    );
    let index =
        QdrantIndex::new(QdrantConfig::from_env().context("Incomplete Qdrant configuration")?)?;
    let chat = ChatClient::new(ChatConfig::from_env().context("Incomplete chat configuration")?);

    Ok(RagEngine::new(
        Arc::new(embedder),
        Arc::new(index),
        Arc::new(chat),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Command::Chunk {
            input,
            output,
            chunk_size,
            chunk_overlap,
        } => {
            let splitter = TextSplitter::new(chunk_size, chunk_overlap)?;
            let chunks = ingest::chunk_folder(&input, &splitter)?;
            ingest::write_json(&output, &chunks)?;
            info!("Chunks written to {}", output.display());
        }

        Command::Embed { input, output } => {
            let embedder = EmbeddingsClient::new(
                EmbeddingsConfig::from_env().context("Incomplete embeddings configuration")?,
            );
            let chunks: Vec<Chunk> = ingest::read_json(&input)?;
            info!("Loaded {} chunks", chunks.len());

            let embedded = ingest::embed_chunks(&embedder, chunks).await;
            ingest::write_json(&output, &embedded)?;
            info!(
                "Saved embeddings for {} chunks to {}",
                embedded.len(),
                output.display()
            );
        }

        Command::Upload { input } => {
            let index = QdrantIndex::new(
                QdrantConfig::from_env().context("Incomplete Qdrant configuration")?,
            )?;
            index.ensure_collection().await?;

            let embedded: Vec<EmbeddedChunk> = ingest::read_json(&input)?;
            info!("Loaded {} embedded chunks", embedded.len());

            ingest::upload_embeddings(&index, &embedded).await;
        }

        Command::Ingest {
            input,
            chunk_size,
            chunk_overlap,
        } => {
            let splitter = TextSplitter::new(chunk_size, chunk_overlap)?;
            let embedder = EmbeddingsClient::new(
                EmbeddingsConfig::from_env().context("Incomplete embeddings configuration")?,
            );
            let index = QdrantIndex::new(
                QdrantConfig::from_env().context("Incomplete Qdrant configuration")?,
            )?;
            index.ensure_collection().await?;

            let chunks = ingest::chunk_folder(&input, &splitter)?;
            ingest::write_json(ingest::DEFAULT_CHUNKS_FILE, &chunks)?;

            let embedded = ingest::embed_chunks(&embedder, chunks).await;
            ingest::write_json(ingest::DEFAULT_EMBEDDINGS_FILE, &embedded)?;

            ingest::upload_embeddings(&index, &embedded).await;
        }

        Command::Ask { question } => {
            let engine = build_engine()?;

            match question {
                Some(question) => {
                    let result = engine.ask(&question).await?;
                    println!("\nAnswer:\n{}", result.answer);
                    println!("\nSources:");
                    for source in &result.sources {
                        println!("- {}", source);
                    }
                }
                None => engine.run_query_loop().await?,
            }
        }

        Command::Serve { port } => {
            let engine = build_engine()?;
            server::serve(engine, port).await?;
        }
    }

    Ok(())
}
