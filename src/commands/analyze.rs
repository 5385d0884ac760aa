use std::fs;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::{info, warn};

use crate::cli::AnalyzeArgs;
use crate::pipeline::{RunContext, Stage};
use crate::report::render_markdown;
use crate::util::{ensure_directory, read_text_input};

use super::setup::{build_navigator, load_config};
use super::{write_json, write_text};

const ALL_STAGES: [Stage; 5] = [
    Stage::Summarize,
    Stage::Retrieve,
    Stage::Assess,
    Stage::Format,
    Stage::Extract,
];

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let description = read_text_input(args.text.as_deref(), args.input.as_deref())?
        .context("analyze needs a system description via --text or --input")?;
    if description.trim().is_empty() {
        bail!("system description is empty");
    }

    let navigator = build_navigator(&config, &ALL_STAGES)?;
    let mut run = RunContext::new();
    let result = navigator.run_full(&mut run, &description);

    let path = run.save(&config.runs_dir)?;
    info!(run_id = %run.run_id, path = %path.display(), "run saved");

    if let Some(report_path) = &args.report_path {
        if let Some(parent) = report_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_directory(parent)?;
            }
        }
        fs::write(report_path, render_markdown(&run))
            .with_context(|| format!("failed to write report: {}", report_path.display()))?;
        info!(path = %report_path.display(), "report written");
    }

    let outcome = result.with_context(|| format!("analysis halted for run {}", run.run_id))?;

    if args.json {
        write_json(&json!({
            "run_id": run.run_id,
            "analysis": outcome.analysis,
            "extraction": run.extraction,
        }))?;
    } else {
        let mut text = format!("Run: {}\n\n{}\n", run.run_id, outcome.analysis.trim_end());
        if let Some(graph) = run.graph() {
            text.push('\n');
            text.push_str(&serde_json::to_string_pretty(graph)?);
            text.push('\n');
        }
        write_text(&text)?;
    }

    if let Err(failure) = outcome.graph {
        warn!(run_id = %run.run_id, state = failure.state(), "analysis produced no graph");
        bail!("graph extraction failed ({}): {failure}", failure.state());
    }
    Ok(())
}
