use super::{ChatModel, ModelRequest, ModelResponse, ProviderError, ProviderKind};
use crate::state::{Message, MessageRole, ToolCall};
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct HttpChatModel {
    kind: ProviderKind,
    base_url: String,
    api_key: String,
    model: String,
    params: Map<String, Value>,
    agent: ureq::Agent,
}

impl HttpChatModel {
    pub fn new(
        kind: ProviderKind,
        api_key: impl Into<String>,
        mut params: Map<String, Value>,
    ) -> Result<Self, ProviderError> {
        let model = params
            .remove("model")
            .and_then(|value| value.as_str().map(str::to_string))
            .ok_or_else(|| ProviderError::MissingParam {
                provider: kind,
                param: "model".to_string(),
            })?;
        let base_url = params
            .remove("base_url")
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| kind.default_base_url().to_string());
        let timeout_secs = params
            .remove("timeout_secs")
            .and_then(|value| value.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(timeout_secs))
            .build();
        Ok(Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model,
            params,
            agent,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Human => "user",
        MessageRole::Ai => "assistant",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    }
}

fn encode_message(message: &Message) -> Value {
    let mut encoded = Map::new();
    encoded.insert("role".to_string(), json!(role_name(message.role)));
    encoded.insert("content".to_string(), json!(message.content));
    if !message.tool_calls.is_empty() {
        let calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.args.to_string(),
                    },
                })
            })
            .collect();
        encoded.insert("tool_calls".to_string(), Value::Array(calls));
    }
    if let Some(tool_call_id) = &message.tool_call_id {
        encoded.insert("tool_call_id".to_string(), json!(tool_call_id));
    }
    Value::Object(encoded)
}

pub fn build_chat_request_body(
    model: &str,
    params: &Map<String, Value>,
    request: &ModelRequest,
) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.trim().is_empty() {
        messages.push(json!({"role": "system", "content": request.system_prompt}));
    }
    messages.extend(request.messages.iter().map(encode_message));

    let mut body = params.clone();
    body.insert("model".to_string(), json!(model));
    body.insert("messages".to_string(), Value::Array(messages));
    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    },
                })
            })
            .collect();
        body.insert("tools".to_string(), Value::Array(tools));
    }
    Value::Object(body)
}

fn decode_tool_call(kind: ProviderKind, raw: &Value) -> Result<ToolCall, ProviderError> {
    let parse_failure = |reason: &str| ProviderError::ParseFailure {
        provider: kind,
        reason: reason.to_string(),
    };
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_failure("tool call is missing `id`"))?;
    let function = raw
        .get("function")
        .ok_or_else(|| parse_failure("tool call is missing `function`"))?;
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_failure("tool call is missing `function.name`"))?;
    let args = match function.get("arguments") {
        Some(Value::String(text)) if text.trim().is_empty() => Value::Object(Map::new()),
        Some(Value::String(text)) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Object(Map::new()),
    };
    Ok(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        args,
    })
}

/// Decodes the first choice. When a response format was requested and the model
/// answered with a bare JSON object, that object becomes the structured response.
pub fn parse_chat_response(
    kind: ProviderKind,
    body: &Value,
    request: &ModelRequest,
) -> Result<ModelResponse, ProviderError> {
    let message = body
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| ProviderError::ParseFailure {
            provider: kind,
            reason: "response has no choices[0].message".to_string(),
        })?;
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = match message.get("tool_calls") {
        Some(Value::Array(calls)) => calls
            .iter()
            .map(|call| decode_tool_call(kind, call))
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };

    let structured_response = if request.response_format.is_some() && tool_calls.is_empty() {
        serde_json::from_str::<Value>(content.trim())
            .ok()
            .filter(Value::is_object)
    } else {
        None
    };

    Ok(ModelResponse {
        message: Message::ai_tool_calls(content, tool_calls),
        structured_response,
    })
}

impl ChatModel for HttpChatModel {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        let body = build_chat_request_body(&self.model, &self.params, request);
        let response = self
            .agent
            .post(&self.endpoint())
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body);
        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Err(ProviderError::Http {
                    provider: self.kind,
                    status,
                    body: response.into_string().unwrap_or_default(),
                })
            }
            Err(err) => {
                return Err(ProviderError::Transport {
                    provider: self.kind,
                    reason: err.to_string(),
                })
            }
        };
        let payload: Value = response
            .into_json()
            .map_err(|err| ProviderError::ParseFailure {
                provider: self.kind,
                reason: err.to_string(),
            })?;
        parse_chat_response(self.kind, &payload, request)
    }
}
