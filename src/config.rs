use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::corpus::{DocumentDescriptor, DocumentFormat};
use crate::semantic::DEFAULT_EMBEDDING_DIM;

pub const DEFAULT_CACHE_DIR: &str = ".cache/coras-navigator/index";
pub const DEFAULT_RUNS_DIR: &str = ".cache/coras-navigator/runs";
pub const DEFAULT_CORPUS_PATH: &str = "rag-docs/capec-abstract.txt";
pub const DEFAULT_DETAIL_TABLE_PATH: &str = "rag-docs/capec-detailed.json";
pub const DEFAULT_IDENTIFIER_PATTERN: &str = r"^\s*\[[A-Za-z]+-(\d+)\]";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    pub cache_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub corpus: Vec<DocumentDescriptor>,
    pub detail_table: DocumentDescriptor,
    pub allow_foreign_index: bool,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub extraction: ExtractionConfig,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            runs_dir: PathBuf::from(DEFAULT_RUNS_DIR),
            corpus: vec![DocumentDescriptor::new(
                DEFAULT_CORPUS_PATH,
                DocumentFormat::Txt,
            )],
            detail_table: DocumentDescriptor::new(DEFAULT_DETAIL_TABLE_PATH, DocumentFormat::Json),
            allow_foreign_index: false,
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub judge_enabled: bool,
    pub judge_top_n: usize,
    pub missing_detail: MissingDetailPolicy,
    pub identifier_pattern: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 6,
            judge_enabled: true,
            judge_top_n: 3,
            missing_detail: MissingDetailPolicy::Skip,
            identifier_pattern: DEFAULT_IDENTIFIER_PATTERN.to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingDetailPolicy {
    Skip,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::LocalHash,
            model: "local-hash-v1".to_string(),
            dimensions: DEFAULT_EMBEDDING_DIM,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    LocalHash,
    Ollama,
}

impl EmbeddingBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocalHash => "local-hash",
            Self::Ollama => "ollama",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub judge_model: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub formatter: FormatterStrategy,
    pub structured_output: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: "llama3:70b-instruct".to_string(),
            judge_model: "llama3:8b".to_string(),
            timeout_secs: 300,
            max_attempts: 3,
            retry_backoff_ms: 500,
            formatter: FormatterStrategy::FewShot,
            structured_output: true,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FormatterStrategy {
    ZeroShot,
    FewShot,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub scanner: ScanStrategy,
    pub vulnerability_policy: VulnerabilityPolicy,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStrategy {
    #[default]
    Balanced,
    Outermost,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum VulnerabilityPolicy {
    #[default]
    Advisory,
    Reject,
}

impl NavigatorConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults_for_missing_sections() {
        let raw = r#"
        {
          "cache_dir": "/var/cache/navigator",
          "retrieval": { "k": 10 },
          "extraction": { "vulnerability_policy": "reject" }
        }
        "#;

        let config: NavigatorConfig = serde_json::from_str(raw).expect("config should parse");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/navigator"));
        assert_eq!(config.retrieval.k, 10);
        assert_eq!(config.retrieval.judge_top_n, 3);
        assert_eq!(config.retrieval.missing_detail, MissingDetailPolicy::Skip);
        assert_eq!(
            config.extraction.vulnerability_policy,
            VulnerabilityPolicy::Reject
        );
        assert_eq!(config.extraction.scanner, ScanStrategy::Balanced);
        assert!(!config.allow_foreign_index);
    }

    #[test]
    fn corpus_descriptors_parse_with_format_tags() {
        let raw = r#"
        {
          "corpus": [
            { "path": "docs/capec.txt", "format": "txt" },
            { "path": "docs/cwe.csv", "format": "csv" }
          ]
        }
        "#;

        let config: NavigatorConfig = serde_json::from_str(raw).expect("config should parse");
        assert_eq!(config.corpus.len(), 2);
        assert_eq!(config.corpus[1].format, DocumentFormat::Csv);
    }

    #[test]
    fn load_without_path_returns_defaults() {
        let config = NavigatorConfig::load(None).expect("defaults");
        assert_eq!(config.retrieval.k, 6);
        assert_eq!(config.embedding.backend, EmbeddingBackend::LocalHash);
    }
}
