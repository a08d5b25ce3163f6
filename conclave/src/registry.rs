//! Capability registry interface: uniform access to reasoning models keyed by
//! string reference, with cost/context metadata used for selection decisions.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// String key identifying a model through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef(pub String);

impl ModelRef {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Cost and capability metadata for one registered model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Registry key for this model.
    pub model: ModelRef,
    /// Human-readable name.
    pub display_name: String,
    /// Context window in tokens.
    pub context_window: u32,
    /// Input cost in dollars per million tokens.
    pub input_cost_per_million: f64,
    /// Output cost in dollars per million tokens. Doubles as the
    /// capability proxy: a more expensive model is presumed stronger.
    pub output_cost_per_million: f64,
    /// Whether this model may be selected as proposer.
    pub proposer_eligible: bool,
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }
}

/// Parameters for a single completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
}

impl SendRequest {
    /// Single user message with default sampling.
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: 4096,
            temperature: 0.7,
            stop_sequences: Vec::new(),
        }
    }
}

/// Token accounting reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A completed provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Uniform interface over heterogeneous reasoning providers. Implementations
/// own transport, retries, and payload shapes; callers only see string-keyed
/// dispatch.
#[async_trait]
pub trait CapabilityRegistry: Send + Sync {
    /// Models currently registered, in registration order.
    async fn list_models(&self) -> Vec<ModelProfile>;

    /// Send a completion request to one model.
    async fn send(&self, model: &ModelRef, request: SendRequest) -> Result<Completion, ProviderError>;

    /// Stream partial content chunks from one model.
    async fn stream(
        &self,
        model: &ModelRef,
        request: SendRequest,
    ) -> Result<BoxStream<'static, Result<String, ProviderError>>, ProviderError>;

    /// Whether the model is currently reachable and serving.
    async fn health_check(&self, model: &ModelRef) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_display() {
        let m = ModelRef::new("opus-large");
        assert_eq!(m.to_string(), "opus-large");
        assert_eq!(m.as_str(), "opus-large");
    }

    #[test]
    fn test_send_request_from_prompt() {
        let req = SendRequest::from_prompt("hello");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert!(req.stop_sequences.is_empty());
    }

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
