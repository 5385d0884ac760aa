use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::corpus::{CacheStatus, CorpusManifest};

use super::setup::{index_cache, load_config};
use super::write_json;

#[derive(Debug, Serialize)]
struct StatusReport {
    cache: CacheStatus,
    configured_manifest: Vec<String>,
    manifest_matches: Option<bool>,
    runs_dir: String,
    runs: Vec<String>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let cache = index_cache(&config)?;
    let status = cache.status();
    let configured = CorpusManifest::new(config.corpus.clone());
    let manifest_matches = status
        .manifest
        .as_ref()
        .map(|recorded| configured.matches_paths(recorded));
    let runs = list_runs(&config.runs_dir)?;

    info!(cache_dir = %status.directory, "status requested");

    if args.json {
        return write_json(&StatusReport {
            configured_manifest: configured.path_keys(),
            manifest_matches,
            runs_dir: config.runs_dir.display().to_string(),
            runs,
            cache: status,
        });
    }

    match &status.manifest {
        Some(recorded) => info!(
            documents = recorded.len(),
            matches_config = manifest_matches.unwrap_or(false),
            "persisted manifest"
        ),
        None => warn!(path = %cache.manifest_path().display(), "no persisted manifest"),
    }

    if status.index_present {
        info!(
            path = %cache.index_path().display(),
            embedder = %status.index_embedder.clone().unwrap_or_default(),
            chunks = status.index_chunks.unwrap_or(0),
            built_at = %status.index_built_at.clone().unwrap_or_default(),
            digest = %status.index_digest.clone().unwrap_or_default(),
            "persisted index"
        );
    } else {
        warn!(path = %cache.index_path().display(), "no persisted index");
    }

    if let Some(problem) = &status.problem {
        warn!(problem = %problem, "cache is not loadable");
    }

    info!(
        runs_dir = %config.runs_dir.display(),
        runs = runs.len(),
        latest = %runs.last().cloned().unwrap_or_default(),
        "stored runs"
    );
    Ok(())
}

fn list_runs(runs_dir: &Path) -> Result<Vec<String>> {
    if !runs_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut runs = Vec::<String>::new();
    for entry in fs::read_dir(runs_dir)
        .with_context(|| format!("failed to list runs in {}", runs_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            runs.push(stem.to_string());
        }
    }
    runs.sort();
    Ok(runs)
}
