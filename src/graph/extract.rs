use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ExtractionConfig, ScanStrategy, VulnerabilityPolicy};
use crate::generation::FormatOutput;

use super::scan::locate_candidate;
use super::validate::{ValidatedGraph, ValidationError, validate_value};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExtractionFailure {
    #[error("no JSON object found in generated text")]
    NoCandidate,

    #[error("candidate JSON object could not be parsed: {detail}")]
    ParseFailed { detail: String },

    #[error("{0}")]
    Invalid(ValidationError),
}

impl ExtractionFailure {
    pub fn state(&self) -> &'static str {
        match self {
            Self::NoCandidate => "no_candidate",
            Self::ParseFailed { .. } => "parse_failed",
            Self::Invalid(_) => "invalid",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphExtractor {
    scanner: ScanStrategy,
    vulnerability_policy: VulnerabilityPolicy,
}

impl GraphExtractor {
    pub fn new(scanner: ScanStrategy, vulnerability_policy: VulnerabilityPolicy) -> Self {
        Self {
            scanner,
            vulnerability_policy,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.scanner, config.vulnerability_policy)
    }

    pub fn extract(&self, text: &str) -> Result<ValidatedGraph, ExtractionFailure> {
        let result = self.scan_and_parse(text).and_then(|value| self.validate(&value));
        log_terminal_state(&result);
        result
    }

    pub fn extract_structured(&self, value: &Value) -> Result<ValidatedGraph, ExtractionFailure> {
        let result = self.validate(value);
        log_terminal_state(&result);
        result
    }

    pub fn extract_output(&self, output: &FormatOutput) -> Result<ValidatedGraph, ExtractionFailure> {
        match output {
            FormatOutput::Text(text) => self.extract(text),
            FormatOutput::Structured(value) => self.extract_structured(value),
        }
    }

    fn scan_and_parse(&self, text: &str) -> Result<Value, ExtractionFailure> {
        let candidate =
            locate_candidate(text, self.scanner).ok_or(ExtractionFailure::NoCandidate)?;
        debug!(
            scanner = ?self.scanner,
            candidate_len = candidate.len(),
            "graph candidate found"
        );
        serde_json::from_str::<Value>(candidate).map_err(|err| ExtractionFailure::ParseFailed {
            detail: err.to_string(),
        })
    }

    fn validate(&self, value: &Value) -> Result<ValidatedGraph, ExtractionFailure> {
        validate_value(value, self.vulnerability_policy).map_err(ExtractionFailure::Invalid)
    }
}

fn log_terminal_state(result: &Result<ValidatedGraph, ExtractionFailure>) {
    match result {
        Ok(validated) => {
            for advisory in &validated.advisories {
                warn!(advisory = %advisory, "threat graph advisory");
            }
            info!(
                state = "valid",
                vertices = validated.graph.vertices.len(),
                edges = validated.graph.edges.len(),
                advisories = validated.advisories.len(),
                "graph extraction finished"
            );
        }
        Err(failure) => {
            warn!(state = failure.state(), error = %failure, "graph extraction finished");
        }
    }
}
