use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::info;

use crate::cli::StageArgs;
use crate::generation::FormatOutput;
use crate::pipeline::{ExtractionRecord, Navigator, RunContext, Stage};
use crate::util::read_text_input;

use super::setup::{build_navigator, load_config};
use super::{write_json, write_text};

enum StageOutput {
    Text(String),
    Formatted(FormatOutput),
    Extraction(ExtractionRecord),
}

pub fn run(stage: Stage, args: StageArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let mut run = match &args.run_id {
        Some(run_id) => RunContext::load(&config.runs_dir, run_id)?,
        None => RunContext::new(),
    };
    info!(run_id = %run.run_id, stage = %stage, "stage requested");

    let navigator = build_navigator(&config, &[stage])?;
    let result = execute(&navigator, &mut run, stage, &args);

    let path = run.save(&config.runs_dir)?;
    info!(run_id = %run.run_id, path = %path.display(), "run saved");

    let output = result.with_context(|| format!("{stage} stage failed for run {}", run.run_id))?;

    if args.json {
        let value = match &output {
            StageOutput::Text(text) => json!(text),
            StageOutput::Formatted(formatted) => serde_json::to_value(formatted)?,
            StageOutput::Extraction(record) => serde_json::to_value(record)?,
        };
        write_json(&json!({
            "run_id": run.run_id,
            "stage": stage,
            "output": value,
        }))?;
    } else {
        match &output {
            StageOutput::Text(text) => write_text(text)?,
            StageOutput::Formatted(formatted) => write_text(&formatted.to_text())?,
            StageOutput::Extraction(ExtractionRecord::Valid { graph, .. }) => {
                write_text(&serde_json::to_string_pretty(graph)?)?
            }
            StageOutput::Extraction(ExtractionRecord::Failed { .. }) => {}
        }
    }

    if let StageOutput::Extraction(ExtractionRecord::Failed { failure }) = output {
        bail!("graph extraction failed ({}): {failure}", failure.state());
    }
    Ok(())
}

fn execute(
    navigator: &Navigator,
    run: &mut RunContext,
    stage: Stage,
    args: &StageArgs,
) -> Result<StageOutput> {
    let input = read_text_input(args.text.as_deref(), args.input.as_deref())?;

    match stage {
        Stage::Summarize => {
            let description = input
                .or_else(|| run.description.clone())
                .context("summarize needs --text or --input, or a run with a stored description")?;
            Ok(StageOutput::Text(navigator.summarize(run, &description)?))
        }
        Stage::Retrieve => {
            let query = input
                .or_else(|| run.summary.clone())
                .or_else(|| run.description.clone())
                .context("retrieve needs --text or --input, or a run with a stored summary")?;
            Ok(StageOutput::Text(navigator.retrieve(run, &query)?))
        }
        Stage::Assess => {
            let description = input
                .or_else(|| run.summary.clone())
                .or_else(|| run.description.clone())
                .context("assess needs --text or --input, or a run with a stored summary")?;
            let context = read_text_input(args.context.as_deref(), args.context_input.as_deref())?
                .or_else(|| run.context.clone())
                .context("assess needs --context or --context-input, or a run with stored context")?;
            Ok(StageOutput::Text(navigator.assess(run, &description, &context)?))
        }
        Stage::Format => {
            let analysis = input
                .or_else(|| run.analysis.clone())
                .context("format needs --text or --input, or a run with a stored analysis")?;
            Ok(StageOutput::Formatted(navigator.format(run, &analysis)?))
        }
        Stage::Extract => {
            let formatted = input
                .map(FormatOutput::Text)
                .or_else(|| run.formatted.clone())
                .context("extract needs --text or --input, or a run with stored format output")?;
            let result = navigator.extract(run, &formatted);
            Ok(StageOutput::Extraction(ExtractionRecord::from_result(&result)))
        }
    }
}
