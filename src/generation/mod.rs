mod client;
mod embedding;
mod prompts;
mod stages;

pub use client::{ChatMessage, ChatRequest, OllamaClient, RetryPolicy, Role, TextGenerator};
pub use embedding::{Embedder, LocalHashEmbedder, OllamaEmbedder, build_embedder};
pub use stages::{
    Assess, Format, FormatOutput, GraphFormatter, Judge, PromptedAssessor, PromptedSummarizer,
    RelevanceJudge, Summarize,
};

#[cfg(test)]
pub use client::ScriptedGenerator;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("generation service is not reachable at {0}")]
    Connection(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("generation service returned error (status {status}): {body}")]
    Service { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("response parsing error: {0}")]
    ResponseParsing(String),

    #[error("generation returned an empty response")]
    EmptyResponse,
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Service { status, .. } => *status >= 500,
            Self::HttpClient(_) | Self::ResponseParsing(_) | Self::EmptyResponse => false,
        }
    }
}
