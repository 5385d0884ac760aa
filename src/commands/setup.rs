use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::CommonArgs;
use crate::config::NavigatorConfig;
use crate::corpus::{CorpusIndexCache, CorpusManifest, DocumentDescriptor, LoadedIndex};
use crate::generation::{
    Embedder, GraphFormatter, OllamaClient, PromptedAssessor, PromptedSummarizer, RelevanceJudge,
    build_embedder,
};
use crate::graph::GraphExtractor;
use crate::pipeline::{Navigator, Stage};
use crate::retrieval::{DetailTable, IdentifierParser, Retriever};

pub(super) fn load_config(common: &CommonArgs) -> Result<NavigatorConfig> {
    let mut config = NavigatorConfig::load(common.config.as_deref())?;

    if let Some(cache_dir) = &common.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    if let Some(runs_dir) = &common.runs_dir {
        config.runs_dir = runs_dir.clone();
    }
    if !common.documents.is_empty() {
        config.corpus = common
            .documents
            .iter()
            .map(DocumentDescriptor::from_path)
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(detail_table) = &common.detail_table {
        config.detail_table = DocumentDescriptor::from_path(detail_table)?;
    }
    if common.allow_foreign_index {
        config.allow_foreign_index = true;
    }
    if let Some(k) = common.k {
        config.retrieval.k = k;
    }
    if common.no_judge {
        config.retrieval.judge_enabled = false;
    }
    if let Some(policy) = common.missing_detail {
        config.retrieval.missing_detail = policy;
    }
    if let Some(backend) = common.embedding_backend {
        config.embedding.backend = backend;
    }
    if let Some(base_url) = &common.base_url {
        config.generation.base_url = base_url.clone();
    }
    if let Some(model) = &common.model {
        config.generation.model = model.clone();
    }
    if let Some(formatter) = common.formatter {
        config.generation.formatter = formatter;
    }
    if let Some(scanner) = common.scanner {
        config.extraction.scanner = scanner;
    }
    if let Some(policy) = common.vulnerability_policy {
        config.extraction.vulnerability_policy = policy;
    }

    Ok(config)
}

pub(super) fn index_cache(config: &NavigatorConfig) -> Result<CorpusIndexCache> {
    let embedder = build_embedder(&config.embedding, &config.generation)
        .context("failed to configure embedder")?;
    Ok(CorpusIndexCache::new(&config.cache_dir, embedder)
        .allow_foreign_index(config.allow_foreign_index))
}

pub(super) fn load_index(config: &NavigatorConfig) -> Result<(LoadedIndex, Arc<dyn Embedder>)> {
    let embedder = build_embedder(&config.embedding, &config.generation)
        .context("failed to configure embedder")?;
    let cache = CorpusIndexCache::new(&config.cache_dir, embedder.clone())
        .allow_foreign_index(config.allow_foreign_index);
    let manifest = CorpusManifest::new(config.corpus.clone());
    let loaded = cache
        .load_or_build(&manifest)
        .with_context(|| format!("failed to prepare index in {}", config.cache_dir.display()))?;
    Ok((loaded, embedder))
}

pub(super) fn build_retriever(config: &NavigatorConfig) -> Result<Retriever> {
    let (loaded, embedder) = load_index(config)?;
    let details = DetailTable::load(&config.detail_table)?;
    let identifiers = IdentifierParser::new(&config.retrieval.identifier_pattern)?;

    let retriever = Retriever::new(
        loaded.index,
        embedder,
        details,
        identifiers,
        config.retrieval.missing_detail,
    );
    if !config.retrieval.judge_enabled {
        return Ok(retriever);
    }

    let judge = OllamaClient::from_config(&config.generation, &config.generation.judge_model)?;
    Ok(retriever.with_judge(
        Box::new(RelevanceJudge::new(judge)),
        config.retrieval.judge_top_n,
    ))
}

// Only the capabilities the requested stages need are wired, so `extract` never touches
// the index or the generation service.
pub(super) fn build_navigator(config: &NavigatorConfig, stages: &[Stage]) -> Result<Navigator> {
    let mut navigator = Navigator::new(
        GraphExtractor::from_config(&config.extraction),
        config.retrieval.k,
    );
    let generation = &config.generation;

    if stages.contains(&Stage::Summarize) {
        let client = OllamaClient::from_config(generation, &generation.model)?;
        navigator = navigator.with_summarizer(Box::new(PromptedSummarizer::new(client)));
    }
    if stages.contains(&Stage::Retrieve) {
        navigator = navigator.with_retriever(build_retriever(config)?);
    }
    if stages.contains(&Stage::Assess) {
        let client = OllamaClient::from_config(generation, &generation.model)?;
        navigator = navigator.with_assessor(Box::new(PromptedAssessor::new(client)));
    }
    if stages.contains(&Stage::Format) {
        let client = OllamaClient::from_config(generation, &generation.model)?;
        navigator = navigator.with_formatter(Box::new(GraphFormatter::new(
            client,
            generation.formatter,
            generation.structured_output,
        )));
    }

    info!(
        stages = ?stages,
        model = %generation.model,
        formatter = ?generation.formatter,
        scanner = ?config.extraction.scanner,
        "navigator configured"
    );
    Ok(navigator)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::{MissingDetailPolicy, ScanStrategy};
    use crate::corpus::DocumentFormat;

    #[test]
    fn flags_override_config_defaults() {
        let common = CommonArgs {
            cache_dir: Some(PathBuf::from("/tmp/cache")),
            documents: vec![PathBuf::from("docs/cwe.txt")],
            detail_table: Some(PathBuf::from("docs/details.json")),
            k: Some(10),
            no_judge: true,
            missing_detail: Some(MissingDetailPolicy::Abort),
            scanner: Some(ScanStrategy::Outermost),
            ..CommonArgs::default()
        };

        let config = load_config(&common).expect("config");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.corpus.len(), 1);
        assert_eq!(config.corpus[0].format, DocumentFormat::Txt);
        assert_eq!(config.detail_table.format, DocumentFormat::Json);
        assert_eq!(config.retrieval.k, 10);
        assert!(!config.retrieval.judge_enabled);
        assert_eq!(config.retrieval.missing_detail, MissingDetailPolicy::Abort);
        assert_eq!(config.extraction.scanner, ScanStrategy::Outermost);
    }

    #[test]
    fn document_with_unknown_extension_is_rejected() {
        let common = CommonArgs {
            documents: vec![PathBuf::from("docs/capec.docx")],
            ..CommonArgs::default()
        };
        assert!(load_config(&common).is_err());
    }

    #[test]
    fn extract_only_navigator_needs_no_services() {
        let config = NavigatorConfig::default();
        assert!(build_navigator(&config, &[Stage::Extract]).is_ok());
    }
}
