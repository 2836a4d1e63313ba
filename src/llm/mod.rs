//! The language-model capability agents can have injected.

pub mod http;
pub mod mock;

pub use self::http::{HttpLanguageModel, HttpModelConfig};
pub use self::mock::MockLanguageModel;

use crate::agent::AgentError;
use std::sync::Arc;

/// A language model an agent may call from inside its operations.
///
/// The runtime never calls this itself; it only hands the instance to agents.
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    /// Send `prompt` along with structured `context` and return the reply.
    fn invoke(&self, prompt: &str, context: &serde_json::Value) -> Result<String, AgentError>;
}

/// The handle stored in [`crate::Capabilities`] and in agent slots.
pub type SharedModel = Arc<dyn LanguageModel>;

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_text_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn truncate_long_text_adds_ellipsis() {
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
    }
}
