use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{NavigatorError, NavigatorResult};
use crate::generation::Embedder;
use crate::util::{temp_sibling, write_json_atomic};

use super::chunking::ensure_supported;
use super::index::SimilarityIndex;
use super::manifest::{CorpusManifest, manifest_paths_equal, read_manifest_file};

pub const INDEX_FILE_NAME: &str = "index.sqlite";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
const LOCK_FILE_NAME: &str = ".build.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildReason {
    NoPersistedIndex,
    ManifestChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum CacheOutcome {
    Reused,
    Built(RebuildReason),
}

pub struct LoadedIndex {
    pub index: SimilarityIndex,
    pub outcome: CacheOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub directory: String,
    pub manifest: Option<Vec<String>>,
    pub index_present: bool,
    pub index_embedder: Option<String>,
    pub index_chunks: Option<usize>,
    pub index_built_at: Option<String>,
    pub index_digest: Option<String>,
    pub problem: Option<String>,
}

pub struct CorpusIndexCache {
    directory: PathBuf,
    embedder: Arc<dyn Embedder>,
    allow_foreign_index: bool,
}

impl CorpusIndexCache {
    pub fn new(directory: impl Into<PathBuf>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            directory: directory.into(),
            embedder,
            allow_foreign_index: false,
        }
    }

    pub fn allow_foreign_index(mut self, allow: bool) -> Self {
        self.allow_foreign_index = allow;
        self
    }

    pub fn index_path(&self) -> PathBuf {
        self.directory.join(INDEX_FILE_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.directory.join(MANIFEST_FILE_NAME)
    }

    pub fn load_or_build(&self, manifest: &CorpusManifest) -> NavigatorResult<LoadedIndex> {
        if manifest.is_empty() {
            return Err(NavigatorError::configuration(
                "corpus manifest lists no documents",
            ));
        }
        for document in manifest.documents() {
            ensure_supported(document)?;
        }

        fs::create_dir_all(&self.directory)?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.directory.join(LOCK_FILE_NAME))?;
        lock.lock_exclusive()?;

        let result = self.load_or_build_locked(manifest);

        if let Err(err) = FileExt::unlock(&lock) {
            warn!(error = %err, "failed to release cache build lock");
        }
        result
    }

    fn load_or_build_locked(&self, manifest: &CorpusManifest) -> NavigatorResult<LoadedIndex> {
        let index_path = self.index_path();
        let manifest_path = self.manifest_path();

        let reason = match read_manifest_file(&manifest_path)? {
            Some(recorded) if manifest.matches_paths(&recorded) => {
                let index = self.load_persisted(&index_path, &recorded)?;
                info!(
                    path = %index_path.display(),
                    chunks = index.len(),
                    "reusing persisted similarity index"
                );
                return Ok(LoadedIndex {
                    index,
                    outcome: CacheOutcome::Reused,
                });
            }
            Some(recorded) => {
                info!(
                    recorded = recorded.len(),
                    requested = manifest.documents().len(),
                    "corpus manifest changed, rebuilding similarity index"
                );
                RebuildReason::ManifestChanged
            }
            None => {
                info!(
                    path = %manifest_path.display(),
                    "no persisted manifest, building similarity index"
                );
                RebuildReason::NoPersistedIndex
            }
        };

        let index = SimilarityIndex::build(manifest, self.embedder.as_ref())?;
        self.persist(&index, manifest)?;

        Ok(LoadedIndex {
            index,
            outcome: CacheOutcome::Built(reason),
        })
    }

    fn load_persisted(&self, index_path: &Path, recorded: &[String]) -> NavigatorResult<SimilarityIndex> {
        let index = SimilarityIndex::open_trusted(index_path, self.allow_foreign_index)?;

        if !manifest_paths_equal(&index.metadata().manifest, recorded) {
            return Err(NavigatorError::corruption(
                index_path,
                "index was built from a different manifest than the one recorded beside it",
            ));
        }

        let expected = self.embedder.identity();
        if index.metadata().embedder != expected {
            return Err(NavigatorError::configuration(format!(
                "persisted index was embedded with '{}' but '{expected}' is configured; remove {} to rebuild",
                index.metadata().embedder,
                self.directory.display()
            )));
        }

        Ok(index)
    }

    // Order matters: the old manifest is removed before the new index is moved into place
    // and the new manifest is written last, so an interrupted persist leaves no manifest
    // and the next load rebuilds.
    fn persist(&self, index: &SimilarityIndex, manifest: &CorpusManifest) -> NavigatorResult<()> {
        let index_path = self.index_path();
        let manifest_path = self.manifest_path();
        let staging = temp_sibling(&index_path, ".building");

        if staging.exists() {
            fs::remove_file(&staging)?;
        }
        index.write_to(&staging)?;

        if manifest_path.exists() {
            fs::remove_file(&manifest_path)?;
        }
        fs::rename(&staging, &index_path)?;

        write_json_atomic(&manifest_path, &manifest.path_keys()).map_err(|err| {
            NavigatorError::Io(std::io::Error::other(format!("{err:#}")))
        })?;

        info!(
            index = %index_path.display(),
            manifest = %manifest_path.display(),
            documents = manifest.documents().len(),
            "persisted similarity index"
        );
        Ok(())
    }

    pub fn status(&self) -> CacheStatus {
        let index_path = self.index_path();
        let mut status = CacheStatus {
            directory: self.directory.display().to_string(),
            manifest: None,
            index_present: index_path.is_file(),
            index_embedder: None,
            index_chunks: None,
            index_built_at: None,
            index_digest: None,
            problem: None,
        };

        match read_manifest_file(&self.manifest_path()) {
            Ok(manifest) => status.manifest = manifest,
            Err(err) => status.problem = Some(err.to_string()),
        }

        if status.index_present {
            match SimilarityIndex::open_trusted(&index_path, self.allow_foreign_index) {
                Ok(index) => {
                    let metadata = index.metadata();
                    status.index_embedder = Some(metadata.embedder.clone());
                    status.index_chunks = Some(metadata.chunk_count);
                    status.index_built_at = Some(metadata.built_at.clone());
                    status.index_digest = Some(metadata.content_digest.clone());
                }
                Err(err) => status.problem = Some(err.to_string()),
            }
        }

        status
    }
}
