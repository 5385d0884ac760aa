use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    EmbeddingBackend, FormatterStrategy, MissingDetailPolicy, ScanStrategy, VulnerabilityPolicy,
};

#[derive(Parser, Debug)]
#[command(
    name = "coras-navigator",
    version,
    about = "CORAS threat model generation with a cached reference-corpus index"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Index(IndexArgs),
    Search(SearchArgs),
    Summarize(StageArgs),
    Retrieve(StageArgs),
    Assess(StageArgs),
    Format(StageArgs),
    Extract(StageArgs),
    Analyze(AnalyzeArgs),
    Report(ReportArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    #[arg(long = "document")]
    pub documents: Vec<PathBuf>,

    #[arg(long)]
    pub detail_table: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub allow_foreign_index: bool,

    #[arg(long)]
    pub k: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub no_judge: bool,

    #[arg(long, value_enum)]
    pub missing_detail: Option<MissingDetailPolicy>,

    #[arg(long, value_enum)]
    pub embedding_backend: Option<EmbeddingBackend>,

    #[arg(long)]
    pub base_url: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, value_enum)]
    pub formatter: Option<FormatterStrategy>,

    #[arg(long, value_enum)]
    pub scanner: Option<ScanStrategy>,

    #[arg(long, value_enum)]
    pub vulnerability_policy: Option<VulnerabilityPolicy>,
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub query: String,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long)]
    pub context: Option<String>,

    #[arg(long)]
    pub context_input: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(long)]
    pub input: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub run_id: String,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}
