mod run;

pub use run::{ExtractionRecord, RunContext};

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{NavigatorError, NavigatorResult};
use crate::generation::{Assess, Format, FormatOutput, Summarize};
use crate::graph::{ExtractionFailure, GraphExtractor, ValidatedGraph};
use crate::retrieval::Retriever;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Summarize,
    Retrieve,
    Assess,
    Format,
    Extract,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Retrieve => "retrieve",
            Self::Assess => "assess",
            Self::Format => "format",
            Self::Extract => "extract",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub analysis: String,
    pub graph: Result<ValidatedGraph, ExtractionFailure>,
}

pub struct Navigator {
    summarizer: Option<Box<dyn Summarize>>,
    retriever: Option<Retriever>,
    assessor: Option<Box<dyn Assess>>,
    formatter: Option<Box<dyn Format>>,
    extractor: GraphExtractor,
    k: usize,
}

impl Navigator {
    pub fn new(extractor: GraphExtractor, k: usize) -> Self {
        Self {
            summarizer: None,
            retriever: None,
            assessor: None,
            formatter: None,
            extractor,
            k,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarize>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_assessor(mut self, assessor: Box<dyn Assess>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn Format>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn summarize(&self, run: &mut RunContext, description: &str) -> NavigatorResult<String> {
        run.description = Some(description.to_string());
        let summary = track(run, Stage::Summarize, || {
            required(&self.summarizer, Stage::Summarize)?
                .summarize(description)
                .map_err(|err| NavigatorError::generation(Stage::Summarize, err))
        })?;
        run.summary = Some(summary.clone());
        Ok(summary)
    }

    pub fn retrieve(&self, run: &mut RunContext, text: &str) -> NavigatorResult<String> {
        let k = self.k;
        let context = track(run, Stage::Retrieve, || {
            let retriever = self
                .retriever
                .as_ref()
                .ok_or_else(|| not_configured(Stage::Retrieve))?;
            let results = retriever.search(text, k)?;
            Ok(results
                .iter()
                .map(|result| format!("{result}\n"))
                .collect::<String>())
        })?;
        run.context = Some(context.clone());
        Ok(context)
    }

    pub fn assess(
        &self,
        run: &mut RunContext,
        description: &str,
        context: &str,
    ) -> NavigatorResult<String> {
        let analysis = track(run, Stage::Assess, || {
            required(&self.assessor, Stage::Assess)?
                .assess(description, context)
                .map_err(|err| NavigatorError::generation(Stage::Assess, err))
        })?;
        run.analysis = Some(analysis.clone());
        Ok(analysis)
    }

    pub fn format(&self, run: &mut RunContext, analysis: &str) -> NavigatorResult<FormatOutput> {
        let formatted = track(run, Stage::Format, || {
            required(&self.formatter, Stage::Format)?
                .format(analysis)
                .map_err(|err| NavigatorError::generation(Stage::Format, err))
        })?;
        run.formatted = Some(formatted.clone());
        Ok(formatted)
    }

    // Extraction failures are values recorded on the run, never errors.
    pub fn extract(
        &self,
        run: &mut RunContext,
        output: &FormatOutput,
    ) -> Result<ValidatedGraph, ExtractionFailure> {
        let result = self.extractor.extract_output(output);
        run.extraction = Some(ExtractionRecord::from_result(&result));
        match &result {
            Ok(_) => run.record_success(Stage::Extract),
            Err(failure) => run.record_failure(Stage::Extract, failure.to_string()),
        }
        result
    }

    pub fn run_full(&self, run: &mut RunContext, description: &str) -> NavigatorResult<AnalysisOutcome> {
        info!(run_id = %run.run_id, "starting full analysis");
        let summary = self.summarize(run, description)?;
        let context = self.retrieve(run, &summary)?;
        let analysis = self.assess(run, &summary, &context)?;
        let formatted = self.format(run, &analysis)?;
        let graph = self.extract(run, &formatted);
        info!(
            run_id = %run.run_id,
            graph = graph.is_ok(),
            "full analysis finished"
        );
        Ok(AnalysisOutcome { analysis, graph })
    }
}

fn required<T: ?Sized>(slot: &Option<Box<T>>, stage: Stage) -> NavigatorResult<&T> {
    slot.as_deref().ok_or_else(|| not_configured(stage))
}

fn not_configured(stage: Stage) -> NavigatorError {
    NavigatorError::configuration(format!("{stage} stage is not configured"))
}

fn track<T>(
    run: &mut RunContext,
    stage: Stage,
    call: impl FnOnce() -> NavigatorResult<T>,
) -> NavigatorResult<T> {
    match call() {
        Ok(value) => {
            run.record_success(stage);
            info!(run_id = %run.run_id, stage = %stage, "stage completed");
            Ok(value)
        }
        Err(err) => {
            warn!(run_id = %run.run_id, stage = %stage, error = %err, "stage failed");
            run.record_failure(stage, err.to_string());
            Err(err)
        }
    }
}
