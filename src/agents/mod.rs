pub mod factory;
pub mod middleware;
pub mod runtime;
pub mod schemas;
pub mod tools;

pub use factory::{
    build_agent_from_files, AgentBlueprint, AgentDeps, AMBIGUITY_CLARIFICATION_AGENT,
    AMBIGUITY_SCAN_AGENT, PROBLEM_FRAMING_AGENT,
};
pub use middleware::{
    context_docs_tool_call_id, AgentMiddleware, ContextDocsMiddleware, DynamicPromptMiddleware,
    GuardrailsMiddleware, CONTEXT_DOCS_TOOL_NAME,
};
pub use runtime::{build_agent, response_format_for, AgentSpec, ModelAgent};
pub use schemas::{AmbiguityScanOutput, ClarificationOutput, ProblemFrame};
pub use tools::{context_lookup, ContextLookupTool, Tool, CONTEXT_LOOKUP_TOOL_NAME};

use crate::evidence::Document;
use crate::provider::ProviderError;
use crate::state::Message;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent `{agent}` model call failed: {source}")]
    Model {
        agent: String,
        #[source]
        source: ProviderError,
    },
    #[error("agent `{agent}` exceeded {max_iterations} model turns without a final answer")]
    IterationLimit { agent: String, max_iterations: u32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentInput {
    pub task_input: String,
    pub messages: Vec<Message>,
    pub context_docs: Vec<Document>,
    pub values: BTreeMap<String, Value>,
}

impl AgentInput {
    pub fn new(task_input: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            task_input: task_input.into(),
            messages,
            ..Self::default()
        }
    }

    pub fn with_context_docs(mut self, docs: Vec<Document>) -> Self {
        self.context_docs = docs;
        self
    }

    pub fn with_value(mut self, name: &str, value: Value) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn placeholder_values(&self) -> BTreeMap<String, String> {
        let mut rendered: BTreeMap<String, String> = self
            .values
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (name.clone(), text)
            })
            .collect();
        rendered
            .entry("task_input".to_string())
            .or_insert_with(|| self.task_input.clone());
        rendered
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResult {
    pub messages: Vec<Message>,
    pub structured_response: Option<Value>,
    pub raw_output: Option<String>,
}

pub trait Agent: Send + Sync {
    fn invoke(&self, input: &AgentInput) -> Result<AgentResult, AgentError>;
}
