use std::time::Duration;

use super::LanguageModel;
use crate::agent::AgentError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use ureq::Agent;

const DEFAULT_ENDPOINT: &str = "http://localhost:11434/v1/chat/completions";
const DEFAULT_MODEL: &str = "llama3.2";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpModelConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for HttpModelConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl HttpModelConfig {
    /// Read `AGENT_RUNTIME_LLM_ENDPOINT`, `AGENT_RUNTIME_LLM_MODEL`,
    /// `AGENT_RUNTIME_LLM_API_KEY` and `AGENT_RUNTIME_LLM_TIMEOUT_SECS`,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let mut config = Self::default();
        if let Some(endpoint) = lookup("AGENT_RUNTIME_LLM_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(model) = lookup("AGENT_RUNTIME_LLM_MODEL") {
            config.model = model;
        }
        config.api_key = lookup("AGENT_RUNTIME_LLM_API_KEY").filter(|k| !k.is_empty());
        if let Some(secs) = lookup("AGENT_RUNTIME_LLM_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                AgentError::invalid(format!("AGENT_RUNTIME_LLM_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// A language model reached over HTTP.
pub struct HttpLanguageModel {
    config: HttpModelConfig,
    agent: Agent,
}

impl HttpLanguageModel {
    pub fn new(config: HttpModelConfig) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build()
            .into();
        Self { config, agent }
    }

    pub fn from_env() -> Result<Self, AgentError> {
        Ok(Self::new(HttpModelConfig::from_env()?))
    }

    pub fn config(&self) -> &HttpModelConfig {
        &self.config
    }

    fn request_body<'a>(&'a self, prompt: &str, context: &serde_json::Value) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !context.is_null() {
            messages.push(ChatMessage {
                role: "system".into(),
                content: format!("Context:\n{context}"),
            });
        }
        messages.push(ChatMessage {
            role: "user".into(),
            content: prompt.to_string(),
        });
        ChatRequest {
            model: &self.config.model,
            messages,
        }
    }
}

impl LanguageModel for HttpLanguageModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn invoke(&self, prompt: &str, context: &serde_json::Value) -> Result<String, AgentError> {
        let body = self.request_body(prompt, context);
        debug!(endpoint = %self.config.endpoint, model = %self.config.model, "sending prompt");

        let mut request = self.agent.post(self.config.endpoint.as_str());
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let raw = request.send_json(&body)?.body_mut().read_to_string()?;

        parse_reply(&raw)
    }
}

fn parse_reply(raw: &str) -> Result<String, AgentError> {
    let response: ChatResponse = serde_json::from_str(raw)?;
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| AgentError::invalid("model response contained no choices"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn config_defaults_when_env_empty() {
        let config = HttpModelConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, HttpModelConfig::default());
    }

    #[test]
    fn config_reads_all_keys() {
        let env: HashMap<&str, &str> = [
            ("AGENT_RUNTIME_LLM_ENDPOINT", "http://example.test/v1/chat"),
            ("AGENT_RUNTIME_LLM_MODEL", "tiny"),
            ("AGENT_RUNTIME_LLM_API_KEY", "secret"),
            ("AGENT_RUNTIME_LLM_TIMEOUT_SECS", " 5 "),
        ]
        .into_iter()
        .collect();

        let config = HttpModelConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.endpoint, "http://example.test/v1/chat");
        assert_eq!(config.model, "tiny");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn config_rejects_bad_timeout() {
        let err = HttpModelConfig::from_lookup(|k| {
            (k == "AGENT_RUNTIME_LLM_TIMEOUT_SECS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::Invalid(_)));
    }

    #[test]
    fn request_body_includes_context_as_system_message() {
        let model = HttpLanguageModel::new(HttpModelConfig::default().with_model("m"));
        let body = model.request_body("hi", &serde_json::json!({"id": "T-1"}));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");

        let body = model.request_body("hi", &serde_json::Value::Null);
        assert_eq!(body.messages.len(), 1);
    }

    #[test]
    fn parse_reply_takes_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(parse_reply(raw).unwrap(), "hello");
    }

    #[test]
    fn parse_reply_without_choices_is_invalid() {
        let err = parse_reply(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, AgentError::Invalid(_)));
    }

    #[test]
    fn invoke_bad_url_returns_error() {
        let model = HttpLanguageModel::new(
            HttpModelConfig::default()
                .with_endpoint("http://localhost:1/nope")
                .with_timeout(Duration::from_secs(2)),
        );
        let result = model.invoke("hello", &serde_json::Value::Null);
        assert!(result.is_err());
    }
}
