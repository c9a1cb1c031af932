pub mod http;

pub use http::{build_chat_request_body, parse_chat_response, HttpChatModel};

use crate::state::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("unknown provider `{0}`")]
    UnknownProvider(String),
    #[error("provider {provider} is missing required parameter `{param}`")]
    MissingParam {
        provider: ProviderKind,
        param: String,
    },
    #[error("provider {provider} returned http {status}: {body}")]
    Http {
        provider: ProviderKind,
        status: u16,
        body: String,
    },
    #[error("provider {provider} transport failure: {reason}")]
    Transport {
        provider: ProviderKind,
        reason: String,
    },
    #[error("provider output parse failure for {provider}: {reason}")]
    ParseFailure {
        provider: ProviderKind,
        reason: String,
    },
    #[error("model invocation failed: {0}")]
    Invocation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ProviderKind {
    type Error = ProviderError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized.contains("anthropic") {
            return Ok(Self::Anthropic);
        }
        if normalized.contains("openai") {
            return Ok(Self::OpenAi);
        }
        Err(ProviderError::UnknownProvider(value.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
}

impl ResponseFormat {
    pub fn as_tool(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: format!("Return the final answer as structured `{}` output.", self.name),
            parameters: self.schema.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub message: Message,
    pub structured_response: Option<Value>,
}

impl ModelResponse {
    pub fn from_message(message: Message) -> Self {
        Self {
            message,
            structured_response: None,
        }
    }
}

/// LLM provider seam. One blocking call per model turn; no internal retries.
pub trait ChatModel: Send + Sync {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError>;
}
