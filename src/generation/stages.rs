use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FormatterStrategy;

use super::GenerationError;
use super::client::{ChatRequest, TextGenerator};
use super::prompts::{
    ASSESSOR_SYSTEM, FEW_SHOT_INPUT, FORMATTER_SYSTEM, JUDGE_SYSTEM, SUMMARIZER_SYSTEM,
    assessor_prompt, few_shot_output, formatter_prompt, graph_json_schema, judge_prompt,
    summarizer_prompt,
};

pub trait Summarize {
    fn summarize(&self, description: &str) -> Result<String, GenerationError>;
}

pub trait Assess {
    fn assess(&self, description: &str, context: &str) -> Result<String, GenerationError>;
}

pub trait Format {
    fn format(&self, analysis: &str) -> Result<FormatOutput, GenerationError>;
}

pub trait Judge {
    fn select(&self, query: &str, entries: &str, top_n: usize) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FormatOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl FormatOutput {
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

pub struct PromptedSummarizer<G> {
    generator: G,
}

impl<G: TextGenerator> PromptedSummarizer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

impl<G: TextGenerator> Summarize for PromptedSummarizer<G> {
    fn summarize(&self, description: &str) -> Result<String, GenerationError> {
        let request = ChatRequest::with_system(SUMMARIZER_SYSTEM).user(summarizer_prompt(description));
        self.generator.generate(&request)
    }
}

pub struct PromptedAssessor<G> {
    generator: G,
}

impl<G: TextGenerator> PromptedAssessor<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

impl<G: TextGenerator> Assess for PromptedAssessor<G> {
    fn assess(&self, description: &str, context: &str) -> Result<String, GenerationError> {
        let request =
            ChatRequest::with_system(ASSESSOR_SYSTEM).user(assessor_prompt(description, context));
        self.generator.generate(&request)
    }
}

pub struct GraphFormatter<G> {
    generator: G,
    strategy: FormatterStrategy,
    structured: bool,
}

impl<G: TextGenerator> GraphFormatter<G> {
    pub fn new(generator: G, strategy: FormatterStrategy, structured: bool) -> Self {
        Self {
            generator,
            strategy,
            structured,
        }
    }

    fn build_request(&self, analysis: &str) -> ChatRequest {
        let mut request = ChatRequest::with_system(FORMATTER_SYSTEM);
        if self.strategy == FormatterStrategy::FewShot {
            request = request.user(FEW_SHOT_INPUT).assistant(few_shot_output());
        }
        request = request.user(formatter_prompt(analysis));
        if self.structured {
            request = request.with_format(graph_json_schema());
        }
        request
    }
}

impl<G: TextGenerator> Format for GraphFormatter<G> {
    fn format(&self, analysis: &str) -> Result<FormatOutput, GenerationError> {
        let response = self.generator.generate(&self.build_request(analysis))?;
        if !self.structured {
            return Ok(FormatOutput::Text(response));
        }

        match serde_json::from_str::<serde_json::Value>(response.trim()) {
            Ok(value) if value.is_object() => Ok(FormatOutput::Structured(value)),
            Ok(_) | Err(_) => {
                warn!(
                    model = %self.generator.model(),
                    "structured formatter returned non-object output, keeping raw text"
                );
                Ok(FormatOutput::Text(response))
            }
        }
    }
}

pub struct RelevanceJudge<G> {
    generator: G,
}

impl<G: TextGenerator> RelevanceJudge<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }
}

impl<G: TextGenerator> Judge for RelevanceJudge<G> {
    fn select(&self, query: &str, entries: &str, top_n: usize) -> Result<String, GenerationError> {
        debug!(top_n, entries_len = entries.len(), "relevance judge invoked");
        let request =
            ChatRequest::with_system(JUDGE_SYSTEM).user(judge_prompt(query, entries, top_n));
        self.generator.generate(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ScriptedGenerator;
    use crate::generation::Role;

    #[test]
    fn summarizer_sends_description_in_user_turn() {
        let summarizer = PromptedSummarizer::new(ScriptedGenerator::new(vec!["structured"]));
        let summary = summarizer
            .summarize("A wearable sends vitals over Bluetooth")
            .expect("summary");

        assert_eq!(summary, "structured");
        let requests = summarizer.generator.requests();
        assert_eq!(requests.len(), 1);
        assert!(
            requests[0]
                .last_user_message()
                .expect("user turn")
                .contains("A wearable sends vitals over Bluetooth")
        );
    }

    #[test]
    fn assessor_includes_description_and_context() {
        let assessor = PromptedAssessor::new(ScriptedGenerator::new(vec!["risks"]));
        assessor
            .assess("wearable", "[CAPEC-651] eavesdropping")
            .expect("analysis");

        let requests = assessor.generator.requests();
        let prompt = requests[0].last_user_message().expect("user turn");
        assert!(prompt.contains("###\nwearable\n###"));
        assert!(prompt.contains("<context>\n[CAPEC-651] eavesdropping\n</context>"));
    }

    #[test]
    fn judge_prompt_carries_query_entries_and_bound() {
        let judge = RelevanceJudge::new(ScriptedGenerator::new(vec!["CAPEC-651 record"]));
        let selected = judge
            .select("wearable streams vitals over Bluetooth", "CAPEC-651 record\nCAPEC-66 record", 3)
            .expect("selection");

        assert_eq!(selected, "CAPEC-651 record");
        let requests = judge.generator.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::System);
        let prompt = requests[0].last_user_message().expect("user turn");
        assert!(prompt.contains("Return the 3 entries"));
        assert!(prompt.contains("<context>\nwearable streams vitals over Bluetooth\n</context>"));
        assert!(prompt.contains("###\nCAPEC-651 record\nCAPEC-66 record\n###"));
    }

    #[test]
    fn few_shot_formatter_prepends_example_turns() {
        let formatter = GraphFormatter::new(
            ScriptedGenerator::new(vec!["{\"vertices\": [], \"edges\": []}"]),
            FormatterStrategy::FewShot,
            false,
        );
        let output = formatter.format("analysis").expect("formatted");
        assert!(matches!(output, FormatOutput::Text(_)));

        let requests = formatter.generator.requests();
        let roles = requests[0]
            .messages
            .iter()
            .map(|message| message.role)
            .collect::<Vec<Role>>();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert!(requests[0].format.is_none());
    }

    #[test]
    fn zero_shot_formatter_sends_only_instructions_and_input() {
        let formatter = GraphFormatter::new(
            ScriptedGenerator::new(vec!["text"]),
            FormatterStrategy::ZeroShot,
            false,
        );
        formatter.format("analysis").expect("formatted");
        assert_eq!(formatter.generator.requests()[0].messages.len(), 2);
    }

    #[test]
    fn structured_formatter_returns_parsed_object() {
        let formatter = GraphFormatter::new(
            ScriptedGenerator::new(vec!["{\"vertices\": [], \"edges\": []}"]),
            FormatterStrategy::ZeroShot,
            true,
        );
        let output = formatter.format("analysis").expect("formatted");

        match output {
            FormatOutput::Structured(value) => assert!(value["vertices"].is_array()),
            FormatOutput::Text(text) => panic!("expected structured output, got {text}"),
        }
        assert!(formatter.generator.requests()[0].format.is_some());
    }

    #[test]
    fn structured_formatter_keeps_text_when_response_is_not_json() {
        let formatter = GraphFormatter::new(
            ScriptedGenerator::new(vec!["Here is the model: {\"vertices\": []}"]),
            FormatterStrategy::ZeroShot,
            true,
        );
        let output = formatter.format("analysis").expect("formatted");
        assert!(matches!(output, FormatOutput::Text(_)));
    }

    #[test]
    fn few_shot_example_is_a_graph_object() {
        let value: serde_json::Value =
            serde_json::from_str(&few_shot_output()).expect("example is json");
        assert_eq!(value["vertices"].as_array().map(Vec::len), Some(6));
        assert_eq!(value["edges"].as_array().map(Vec::len), Some(5));
    }

    #[test]
    fn generation_errors_propagate_from_stages() {
        let summarizer = PromptedSummarizer::new(ScriptedGenerator::failing(
            GenerationError::Timeout(30),
        ));
        let err = summarizer.summarize("x").expect_err("timeout");
        assert!(matches!(err, GenerationError::Timeout(30)));
    }
}
