use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GenerationConfig;

use super::GenerationError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub format: Option<serde_json::Value>,
}

impl ChatRequest {
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::System,
                content: system.into(),
            }],
            format: None,
        }
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: content.into(),
        });
        self
    }

    pub fn assistant(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content: content.into(),
        });
        self
    }

    pub fn with_format(mut self, schema: serde_json::Value) -> Self {
        self.format = Some(schema);
        self
    }

    #[cfg(test)]
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
    }
}

pub trait TextGenerator {
    fn model(&self) -> &str;

    fn generate(&self, request: &ChatRequest) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    pub fn run<T>(
        &self,
        operation: &str,
        mut call: impl FnMut() -> Result<T, GenerationError>,
    ) -> Result<T, GenerationError> {
        let mut attempt = 1u32;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient generation failure, retrying"
                    );
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

pub(super) fn build_http_client(
    timeout_secs: u64,
) -> Result<reqwest::blocking::Client, GenerationError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| GenerationError::HttpClient(e.to_string()))
}

pub(super) fn map_transport_error(
    error: reqwest::Error,
    base_url: &str,
    timeout_secs: u64,
) -> GenerationError {
    if error.is_connect() {
        GenerationError::Connection(base_url.to_string())
    } else if error.is_timeout() {
        GenerationError::Timeout(timeout_secs)
    } else {
        GenerationError::HttpClient(error.to_string())
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    model: String,
    timeout_secs: u64,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a serde_json::Value>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

#[derive(Deserialize)]
struct OllamaChatMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        model: &str,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_http_client(timeout_secs)?,
            model: model.to_string(),
            timeout_secs,
            retry,
        })
    }

    pub fn from_config(config: &GenerationConfig, model: &str) -> Result<Self, GenerationError> {
        Self::new(
            &config.base_url,
            model,
            config.timeout_secs,
            RetryPolicy::new(config.max_attempts, config.retry_backoff_ms),
        )
    }

    fn chat_once(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            format: request.format.as_ref(),
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| map_transport_error(e, &self.base_url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        if parsed.message.content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(parsed.message.content)
    }
}

impl TextGenerator for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            structured = request.format.is_some(),
            "chat request"
        );
        self.retry.run("chat", || self.chat_once(request))
    }
}

#[cfg(test)]
pub struct ScriptedGenerator {
    responses: std::cell::RefCell<std::collections::VecDeque<Result<String, GenerationError>>>,
    requests: std::cell::RefCell<Vec<ChatRequest>>,
}

#[cfg(test)]
impl ScriptedGenerator {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: std::cell::RefCell::new(
                responses
                    .into_iter()
                    .map(|value| Ok(value.to_string()))
                    .collect(),
            ),
            requests: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn failing(error: GenerationError) -> Self {
        Self {
            responses: std::cell::RefCell::new(std::iter::once(Err(error)).collect()),
            requests: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }
}

#[cfg(test)]
impl TextGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn retry_policy_retries_transient_failures_up_to_limit() {
        let policy = RetryPolicy::new(3, 0);
        let calls = Cell::new(0u32);

        let result: Result<(), GenerationError> = policy.run("test", || {
            calls.set(calls.get() + 1);
            Err(GenerationError::Timeout(1))
        });

        assert!(matches!(result, Err(GenerationError::Timeout(1))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_policy_does_not_retry_permanent_failures() {
        let policy = RetryPolicy::new(5, 0);
        let calls = Cell::new(0u32);

        let result: Result<(), GenerationError> = policy.run("test", || {
            calls.set(calls.get() + 1);
            Err(GenerationError::Service {
                status: 404,
                body: "model not found".to_string(),
            })
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retry_policy_returns_first_success() {
        let policy = RetryPolicy::new(3, 0);
        let calls = Cell::new(0u32);

        let result = policy.run("test", || {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(GenerationError::Connection("http://localhost:11434".to_string()))
            } else {
                Ok("done")
            }
        });

        assert_eq!(result.expect("second attempt succeeds"), "done");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn retry_policy_always_makes_at_least_one_attempt() {
        let policy = RetryPolicy::new(0, 0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3:8b", 60, RetryPolicy::new(1, 0))
            .expect("client");
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.model(), "llama3:8b");
    }

    #[test]
    fn chat_request_builder_orders_turns() {
        let request = ChatRequest::with_system("system")
            .user("example input")
            .assistant("example output")
            .user("actual input");

        let roles = request
            .messages
            .iter()
            .map(|message| message.role)
            .collect::<Vec<Role>>();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(request.last_user_message(), Some("actual input"));
    }

    #[test]
    fn chat_request_serializes_roles_in_lowercase() {
        let body = OllamaChatRequest {
            model: "llama3:8b",
            messages: &ChatRequest::with_system("s").user("u").messages,
            stream: false,
            format: None,
            options: OllamaOptions { temperature: 0.0 },
        };

        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert!(value.get("format").is_none());
    }
}
