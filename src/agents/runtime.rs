use super::middleware::AgentMiddleware;
use super::tools::Tool;
use super::{Agent, AgentError, AgentInput, AgentResult};
use crate::contract::OutputSchema;
use crate::provider::{ChatModel, ModelRequest, ResponseFormat, ToolSpec};
use crate::shared::EngineLog;
use crate::state::{Message, ToolCall, ToolStatus};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_MAX_ITERATIONS: u32 = 6;

pub fn response_format_for<S: OutputSchema>() -> ResponseFormat {
    ResponseFormat {
        name: S::NAME.to_string(),
        schema: S::json_schema(),
    }
}

pub struct AgentSpec {
    pub name: String,
    pub model: Arc<dyn ChatModel>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub system_prompt: String,
    pub middleware: Vec<Arc<dyn AgentMiddleware>>,
    pub response_format: Option<ResponseFormat>,
    pub max_iterations: u32,
    pub log: EngineLog,
}

pub struct ModelAgent {
    name: String,
    model: Arc<dyn ChatModel>,
    tools: BTreeMap<String, Arc<dyn Tool>>,
    tool_specs: Vec<ToolSpec>,
    system_prompt: String,
    middleware: Vec<Arc<dyn AgentMiddleware>>,
    response_format: Option<ResponseFormat>,
    max_iterations: u32,
    log: EngineLog,
}

pub fn build_agent(spec: AgentSpec) -> ModelAgent {
    let mut tool_specs: Vec<ToolSpec> = spec.tools.iter().map(|tool| tool.spec()).collect();
    for middleware in &spec.middleware {
        tool_specs.extend(middleware.tools());
    }
    if let Some(format) = &spec.response_format {
        tool_specs.push(format.as_tool());
    }
    let tools = spec
        .tools
        .into_iter()
        .map(|tool| (tool.spec().name, tool))
        .collect();
    ModelAgent {
        name: spec.name,
        model: spec.model,
        tools,
        tool_specs,
        system_prompt: spec.system_prompt,
        middleware: spec.middleware,
        response_format: spec.response_format,
        max_iterations: spec.max_iterations.max(1),
        log: spec.log,
    }
}

impl ModelAgent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_specs.iter().map(|spec| spec.name.as_str()).collect()
    }

    fn run_tool(&self, call: &ToolCall, structured: &mut Option<Value>) -> Message {
        if let Some(format) = &self.response_format {
            if call.name == format.name {
                *structured = Some(call.args.clone());
                return Message::tool(
                    call.id.clone(),
                    call.name.clone(),
                    "Returning structured response.",
                    ToolStatus::Success,
                );
            }
        }
        let Some(tool) = self.tools.get(&call.name) else {
            return Message::tool(
                call.id.clone(),
                call.name.clone(),
                format!("Tool `{}` is not available.", call.name),
                ToolStatus::Error,
            );
        };
        match tool.invoke(&call.args) {
            Ok(output) => Message::tool(call.id.clone(), call.name.clone(), output, ToolStatus::Success),
            Err(reason) => {
                self.log.warn(
                    "agent.tool_failed",
                    &[("agent", json!(self.name)), ("tool", json!(call.name)), ("reason", json!(reason))],
                );
                Message::tool(call.id.clone(), call.name.clone(), reason, ToolStatus::Error)
            }
        }
    }
}

impl Agent for ModelAgent {
    fn invoke(&self, input: &AgentInput) -> Result<AgentResult, AgentError> {
        let mut conversation = input.messages.clone();
        let mut produced = Vec::new();

        for _ in 0..self.max_iterations {
            let mut request = ModelRequest {
                system_prompt: self.system_prompt.clone(),
                messages: conversation.clone(),
                tools: self.tool_specs.clone(),
                response_format: self.response_format.clone(),
            };
            let short_circuit = self
                .middleware
                .iter()
                .find_map(|middleware| middleware.before_model(input, &mut request));
            let response = match short_circuit {
                Some(response) => response,
                None => self.model.invoke(&request).map_err(|source| AgentError::Model {
                    agent: self.name.clone(),
                    source,
                })?,
            };

            conversation.push(response.message.clone());
            produced.push(response.message.clone());

            if let Some(structured) = response.structured_response {
                return Ok(AgentResult {
                    messages: produced,
                    raw_output: Some(structured.to_string()),
                    structured_response: Some(structured),
                });
            }
            if response.message.tool_calls.is_empty() {
                return Ok(AgentResult {
                    raw_output: Some(response.message.content.clone()),
                    messages: produced,
                    structured_response: None,
                });
            }

            let mut structured = None;
            for call in &response.message.tool_calls {
                let tool_message = self
                    .middleware
                    .iter()
                    .find_map(|middleware| middleware.wrap_tool_call(input, call))
                    .unwrap_or_else(|| self.run_tool(call, &mut structured));
                conversation.push(tool_message.clone());
                produced.push(tool_message);
            }
            if let Some(structured) = structured {
                return Ok(AgentResult {
                    messages: produced,
                    raw_output: Some(structured.to_string()),
                    structured_response: Some(structured),
                });
            }
        }

        self.log.error(
            "agent.iteration_limit",
            &[("agent", json!(self.name)), ("max_iterations", json!(self.max_iterations))],
        );
        Err(AgentError::IterationLimit {
            agent: self.name.clone(),
            max_iterations: self.max_iterations,
        })
    }
}
