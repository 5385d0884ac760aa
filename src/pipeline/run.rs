use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::generation::FormatOutput;
use crate::graph::{ExtractionFailure, GraphViolation, ThreatGraph, ValidatedGraph};
use crate::util::{now_utc_string, utc_compact_string, write_json_atomic};

use super::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionRecord {
    Valid {
        graph: ThreatGraph,
        advisories: Vec<GraphViolation>,
    },
    Failed {
        failure: ExtractionFailure,
    },
}

impl ExtractionRecord {
    pub fn from_result(result: &Result<ValidatedGraph, ExtractionFailure>) -> Self {
        match result {
            Ok(validated) => Self::Valid {
                graph: validated.graph.clone(),
                advisories: validated.advisories.clone(),
            },
            Err(failure) => Self::Failed {
                failure: failure.clone(),
            },
        }
    }

    pub fn graph(&self) -> Option<&ThreatGraph> {
        match self {
            Self::Valid { graph, .. } => Some(graph),
            Self::Failed { .. } => None,
        }
    }
}

// One logical session. Each stage overwrites its own artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub context: Option<String>,
    pub analysis: Option<String>,
    pub formatted: Option<FormatOutput>,
    pub extraction: Option<ExtractionRecord>,
    #[serde(default)]
    pub completed_stages: Vec<Stage>,
    pub failed_stage: Option<Stage>,
    pub failure_reason: Option<String>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        let now = now_utc_string();
        Self {
            run_id: format!("run-{}-{}", utc_compact_string(Utc::now()), &simple[..8]),
            created_at: now.clone(),
            updated_at: now,
            description: None,
            summary: None,
            context: None,
            analysis: None,
            formatted: None,
            extraction: None,
            completed_stages: Vec::new(),
            failed_stage: None,
            failure_reason: None,
        }
    }

    pub fn record_success(&mut self, stage: Stage) {
        if !self.completed_stages.contains(&stage) {
            self.completed_stages.push(stage);
        }
        if self.failed_stage == Some(stage) {
            self.failed_stage = None;
            self.failure_reason = None;
        }
        self.updated_at = now_utc_string();
    }

    pub fn record_failure(&mut self, stage: Stage, reason: impl Into<String>) {
        self.completed_stages.retain(|completed| *completed != stage);
        self.failed_stage = Some(stage);
        self.failure_reason = Some(reason.into());
        self.updated_at = now_utc_string();
    }

    pub fn graph(&self) -> Option<&ThreatGraph> {
        self.extraction.as_ref().and_then(ExtractionRecord::graph)
    }

    pub fn path_in(runs_dir: &Path, run_id: &str) -> Result<PathBuf> {
        if run_id.is_empty()
            || !run_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            bail!("invalid run id '{run_id}'");
        }
        Ok(runs_dir.join(format!("{run_id}.json")))
    }

    pub fn save(&self, runs_dir: &Path) -> Result<PathBuf> {
        let path = Self::path_in(runs_dir, &self.run_id)?;
        write_json_atomic(&path, self)
            .with_context(|| format!("failed to persist run {}", self.run_id))?;
        Ok(path)
    }

    pub fn load(runs_dir: &Path, run_id: &str) -> Result<Self> {
        let path = Self::path_in(runs_dir, run_id)?;
        let raw = fs::read(&path)
            .with_context(|| format!("failed to read run file: {}", path.display()))?;
        let run: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse run file: {}", path.display()))?;
        Ok(run)
    }
}
