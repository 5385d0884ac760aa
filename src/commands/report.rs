use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ReportArgs;
use crate::pipeline::RunContext;
use crate::report::render_markdown;
use crate::util::ensure_directory;

use super::setup::load_config;
use super::write_text;

pub fn run(args: ReportArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let run = RunContext::load(&config.runs_dir, &args.run_id)?;
    let rendered = render_markdown(&run);

    let Some(output) = &args.output else {
        return write_text(&rendered);
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }
    fs::write(output, rendered)
        .with_context(|| format!("failed to write report: {}", output.display()))?;
    info!(run_id = %run.run_id, path = %output.display(), "report written");
    Ok(())
}
