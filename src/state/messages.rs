use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Human,
    Ai,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            status: None,
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Human, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Ai, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    pub fn ai_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(MessageRole::Ai, content)
        }
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        status: ToolStatus,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            status: Some(status),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }

    pub fn is_human(&self) -> bool {
        self.role == MessageRole::Human
    }

    pub fn is_ai(&self) -> bool {
        self.role == MessageRole::Ai
    }
}

// Status strings that belong in trace events, never in the conversation.
const OPERATIONAL_PATTERNS: &[&str] = &[
    "running safety checks",
    "retrieving context",
    "rescanning ambiguities",
    "clarification pending",
    "via the phase supervisor",
    "ambiguity checks complete",
    "no high-priority ambiguities",
    "ambiguities detected:",
    "context items",
    "phase complete",
    "all phases complete",
];

pub fn is_operational_text(text: &str) -> bool {
    let normalized = text.trim().to_ascii_lowercase();
    normalized.starts_with("running ")
        || OPERATIONAL_PATTERNS
            .iter()
            .any(|pattern| normalized.contains(pattern))
}

pub fn latest_user_input(messages: &[Message]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|message| message.is_human())
        .map(|message| message.content.as_str())
}

pub fn is_latest_message_human(messages: &[Message]) -> bool {
    messages.last().is_some_and(Message::is_human)
}

pub fn count_human_messages(messages: &[Message]) -> usize {
    messages.iter().filter(|message| message.is_human()).count()
}

pub fn build_llm_messages(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|message| match message.role {
            MessageRole::Human | MessageRole::System => true,
            MessageRole::Ai => message.tool_calls.is_empty() && !is_operational_text(&message.content),
            MessageRole::Tool => false,
        })
        .cloned()
        .collect()
}
