use super::AgentInput;
use crate::contract::render_placeholders;
use crate::evidence::Document;
use crate::guardrails::{evaluate_guardrails, GuardrailResult, GuardrailsConfig};
use crate::provider::{ModelRequest, ModelResponse, ToolSpec};
use crate::shared::{sha256_hex, EngineLog};
use crate::state::{latest_user_input, Message, MessageRole, ToolCall, ToolStatus};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

pub const CONTEXT_DOCS_TOOL_NAME: &str = "context_docs";
pub const GUARDRAILS_REJECTION: &str = "Request rejected by guardrails.";
pub const TOOL_NOT_ALLOWED: &str = "Tool not allowed by policy.";

pub trait AgentMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn before_model(&self, _input: &AgentInput, _request: &mut ModelRequest) -> Option<ModelResponse> {
        None
    }

    fn wrap_tool_call(&self, _input: &AgentInput, _call: &ToolCall) -> Option<Message> {
        None
    }

    fn tools(&self) -> Vec<ToolSpec> {
        Vec::new()
    }
}

pub struct GuardrailsMiddleware {
    config: GuardrailsConfig,
    allowed_tools: BTreeSet<String>,
    log: EngineLog,
}

impl GuardrailsMiddleware {
    pub fn new(config: GuardrailsConfig, allowed_tools: BTreeSet<String>, log: EngineLog) -> Self {
        Self {
            config,
            allowed_tools,
            log,
        }
    }

    pub fn verdict(&self, text: &str) -> GuardrailResult {
        evaluate_guardrails(text, &self.config)
    }

    pub fn allowed_tools(&self) -> &BTreeSet<String> {
        &self.allowed_tools
    }
}

impl AgentMiddleware for GuardrailsMiddleware {
    fn name(&self) -> &'static str {
        "guardrails"
    }

    fn before_model(&self, _input: &AgentInput, request: &mut ModelRequest) -> Option<ModelResponse> {
        let text = latest_user_input(&request.messages).filter(|text| !text.is_empty())?;
        let verdict = self.verdict(text);
        if verdict.passed() {
            return None;
        }
        self.log
            .warn("guardrails.blocked", &[("reasons", json!(verdict.reasons))]);
        Some(ModelResponse::from_message(Message::ai(GUARDRAILS_REJECTION)))
    }

    fn wrap_tool_call(&self, _input: &AgentInput, call: &ToolCall) -> Option<Message> {
        if self.allowed_tools.is_empty() || self.allowed_tools.contains(&call.name) {
            return None;
        }
        self.log.warn("tool.blocked", &[("tool", json!(call.name))]);
        Some(Message::tool(
            call.id.clone(),
            call.name.clone(),
            TOOL_NOT_ALLOWED,
            ToolStatus::Error,
        ))
    }
}

fn serialize_context_docs(docs: &[Document]) -> Vec<Value> {
    docs.iter()
        .map(|doc| json!({"text": doc.page_content, "metadata": doc.metadata}))
        .collect()
}

fn doc_sort_key(doc: &Document) -> (String, String, String) {
    let namespace = doc.store_namespace().unwrap_or_default().join("|");
    let key = doc.store_key().unwrap_or_default().to_string();
    (namespace, key, doc.page_content.clone())
}

/// `context_docs_<12 hex>` over the docs sorted by (namespace, key, text).
/// Identical doc sets always produce the same id.
pub fn context_docs_tool_call_id(docs: &[Document]) -> String {
    let mut ordered: Vec<&Document> = docs.iter().collect();
    ordered.sort_by_key(|doc| doc_sort_key(doc));
    let ordered: Vec<Document> = ordered.into_iter().cloned().collect();
    let fingerprint = Value::Array(serialize_context_docs(&ordered)).to_string();
    let digest = sha256_hex(fingerprint.as_bytes());
    format!("{CONTEXT_DOCS_TOOL_NAME}_{}", &digest[..12])
}

#[derive(Debug, Default)]
pub struct ContextDocsMiddleware;

impl AgentMiddleware for ContextDocsMiddleware {
    fn name(&self) -> &'static str {
        "context_docs"
    }

    fn before_model(&self, input: &AgentInput, request: &mut ModelRequest) -> Option<ModelResponse> {
        if input.context_docs.is_empty() {
            return None;
        }
        let already_sent = request.messages.iter().any(|message| {
            message.role == MessageRole::Tool
                && message.name.as_deref() == Some(CONTEXT_DOCS_TOOL_NAME)
        });
        if already_sent {
            return None;
        }
        let call = ToolCall {
            id: context_docs_tool_call_id(&input.context_docs),
            name: CONTEXT_DOCS_TOOL_NAME.to_string(),
            args: Value::Object(Map::new()),
        };
        Some(ModelResponse::from_message(Message::ai_tool_calls(
            "",
            vec![call],
        )))
    }

    fn wrap_tool_call(&self, input: &AgentInput, call: &ToolCall) -> Option<Message> {
        if call.name != CONTEXT_DOCS_TOOL_NAME {
            return None;
        }
        let payload = Value::Array(serialize_context_docs(&input.context_docs)).to_string();
        Some(Message::tool(
            call.id.clone(),
            CONTEXT_DOCS_TOOL_NAME,
            payload,
            ToolStatus::Success,
        ))
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: CONTEXT_DOCS_TOOL_NAME.to_string(),
            description: "Returns the retrieved context documents for this step.".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }]
    }
}

#[derive(Debug, Clone)]
pub struct DynamicPromptMiddleware {
    placeholders: Vec<String>,
}

impl DynamicPromptMiddleware {
    pub fn new<S: AsRef<str>>(placeholders: &[S]) -> Self {
        Self {
            placeholders: placeholders
                .iter()
                .map(|name| name.as_ref().to_string())
                .collect(),
        }
    }
}

impl AgentMiddleware for DynamicPromptMiddleware {
    fn name(&self) -> &'static str {
        "dynamic_prompt"
    }

    fn before_model(&self, input: &AgentInput, request: &mut ModelRequest) -> Option<ModelResponse> {
        let values = input
            .placeholder_values()
            .into_iter()
            .filter(|(name, _)| self.placeholders.contains(name))
            .collect();
        request.system_prompt = render_placeholders(&request.system_prompt, &values);
        None
    }
}
