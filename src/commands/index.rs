use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::IndexArgs;
use crate::corpus::{CacheOutcome, IndexedDocument};

use super::setup::{load_config, load_index};
use super::{write_json, write_text};

#[derive(Debug, Serialize)]
struct IndexSummary {
    cache_dir: String,
    outcome: CacheOutcome,
    embedder: String,
    chunks: usize,
    built_at: String,
    content_digest: String,
    documents: Vec<IndexedDocument>,
}

pub fn run(args: IndexArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let (loaded, _) = load_index(&config)?;
    let metadata = loaded.index.metadata();

    info!(
        cache_dir = %config.cache_dir.display(),
        outcome = ?loaded.outcome,
        chunks = loaded.index.len(),
        "index ready"
    );
    if loaded.index.is_empty() {
        warn!("corpus produced no chunks; retrieval will return no context");
    }

    let summary = IndexSummary {
        cache_dir: config.cache_dir.display().to_string(),
        outcome: loaded.outcome,
        embedder: metadata.embedder.clone(),
        chunks: metadata.chunk_count,
        built_at: metadata.built_at.clone(),
        content_digest: metadata.content_digest.clone(),
        documents: loaded.index.documents().to_vec(),
    };

    if args.json {
        return write_json(&summary);
    }

    let outcome = match summary.outcome {
        CacheOutcome::Reused => "reused persisted index".to_string(),
        CacheOutcome::Built(reason) => format!("built new index ({reason:?})"),
    };
    let mut text = format!(
        "Index: {}\nOutcome: {outcome}\nEmbedder: {}\nChunks: {}\nBuilt at: {}\nDigest: {}\n",
        summary.cache_dir, summary.embedder, summary.chunks, summary.built_at, summary.content_digest
    );
    for document in &summary.documents {
        text.push_str(&format!(
            "  {} [{}] chunks={} sha256={}\n",
            document.path, document.format, document.chunk_count, document.sha256
        ));
    }
    write_text(&text)
}
