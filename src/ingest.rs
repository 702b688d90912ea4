use anyhow::{Context, Result};
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::chunking::{chunk_text, Chunk, TextSplitter};
use crate::document::{self, Document};
use crate::embeddings::{EmbeddedChunk, Embedder};
use crate::index::{IndexedDocument, VectorIndex};

/// Default locations, mirroring the layout the query side expects.
pub const DEFAULT_INPUT_DIR: &str = "docs_to_ingest";
pub const DEFAULT_CHUNKS_FILE: &str = "output/chunks.json";
pub const DEFAULT_EMBEDDINGS_FILE: &str = "output/chunks_embeddings.json";

/// Scan `input_dir` in name order and chunk every supported document.
/// Unsupported files are skipped with a notice.
pub fn chunk_folder(input_dir: &Path, splitter: &TextSplitter) -> Result<Vec<Chunk>> {
    let mut paths: Vec<_> = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read input folder {}", input_dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let file_count = paths.len();
    let mut all_chunks = Vec::new();

    for path in paths {
        if !document::is_supported(&path) {
            info!("Skipping unsupported file: {}", path.display());
            continue;
        }

        let document = Document::from_file(&path)
            .with_context(|| format!("Failed to process document {}", path.display()))?;
        let chunks = chunk_text(splitter, &document.content, &document.source);
        info!("Split {} into {} chunks", document.source, chunks.len());
        all_chunks.extend(chunks);
    }

    info!(
        "Prepared {} chunks from {} files",
        all_chunks.len(),
        file_count
    );

    Ok(all_chunks)
}

/// Embed chunks one request at a time. A failing chunk is logged and
/// skipped; the batch keeps going.
pub async fn embed_chunks(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Vec<EmbeddedChunk> {
    let total = chunks.len();
    let mut embedded = Vec::with_capacity(total);

    for chunk in chunks {
        match embedder.embed(&chunk.content).await {
            Ok(embedding) => embedded.push(EmbeddedChunk::new(chunk, embedding)),
            Err(e) => error!("Failed to embed chunk {}: {}", chunk.id, e),
        }
    }

    info!("Embedded {} of {} chunks", embedded.len(), total);

    embedded
}

/// Upload embedded chunks one document at a time, filtering each record down
/// to the index schema. Returns the number of successful uploads; a failing
/// document does not stop the rest.
pub async fn upload_embeddings(index: &dyn VectorIndex, embedded: &[EmbeddedChunk]) -> usize {
    let mut uploaded = 0;

    for chunk in embedded {
        let document = IndexedDocument::from(chunk);
        match index.upload(document).await {
            Ok(()) => {
                info!("Uploaded chunk {}", chunk.id);
                uploaded += 1;
            }
            Err(e) => error!("Error uploading chunk {}: {}", chunk.id, e),
        }
    }

    info!("Uploaded {} of {} chunks", uploaded, embedded.len());

    uploaded
}

/// Write a value as indented JSON, creating the parent folder on demand.
/// Non-ASCII text is written as-is.
pub fn write_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file =
        fs::File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Read a JSON value written by [`write_json`].
pub fn read_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let value = serde_json::from_reader(file)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(value)
}
