use super::middleware::{
    AgentMiddleware, ContextDocsMiddleware, DynamicPromptMiddleware, GuardrailsMiddleware,
    CONTEXT_DOCS_TOOL_NAME,
};
use super::runtime::{build_agent, response_format_for, AgentSpec, ModelAgent};
use super::tools::Tool;
use crate::config::{ConfigError, FileLoader};
use crate::contract::{build_allowed_tools, compose_agent_prompt, validate_prompt_placeholders, OutputSchema};
use crate::guardrails::GuardrailsConfig;
use crate::provider::ChatModel;
use crate::shared::EngineLog;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentBlueprint {
    pub name: &'static str,
    pub placeholders: &'static [&'static str],
    pub required_placeholders: &'static [&'static str],
}

pub const PROBLEM_FRAMING_AGENT: AgentBlueprint = AgentBlueprint {
    name: "problem_framing",
    placeholders: &["task_input"],
    required_placeholders: &["task_input"],
};

pub const AMBIGUITY_SCAN_AGENT: AgentBlueprint = AgentBlueprint {
    name: "ambiguity_scan",
    placeholders: &["task_input"],
    required_placeholders: &["task_input"],
};

pub const AMBIGUITY_CLARIFICATION_AGENT: AgentBlueprint = AgentBlueprint {
    name: "ambiguity_clarification",
    placeholders: &["user_input", "keys_to_clarify", "ambiguous_items", "phase"],
    required_placeholders: &["keys_to_clarify"],
};

#[derive(Clone)]
pub struct AgentDeps {
    pub model: Arc<dyn ChatModel>,
    pub guardrails: GuardrailsConfig,
    pub tools: Vec<Arc<dyn Tool>>,
    pub max_iterations: u32,
    pub log: EngineLog,
}

pub fn build_agent_from_files<S: OutputSchema>(
    loader: &FileLoader,
    blueprint: &AgentBlueprint,
    deps: &AgentDeps,
) -> Result<ModelAgent, ConfigError> {
    let prompt_error = |reason: String| ConfigError::Prompt {
        agent: blueprint.name.to_string(),
        reason,
    };
    let files = loader.load_agent_prompts(blueprint.name)?;
    let system_prompt = compose_agent_prompt(&files.system, files.few_shots.as_deref(), &files.examples)
        .map_err(|err| prompt_error(err.to_string()))?;
    validate_prompt_placeholders(&system_prompt, blueprint.required_placeholders)
        .map_err(|err| prompt_error(err.to_string()))?;

    let mut tool_names: Vec<String> = deps.tools.iter().map(|tool| tool.spec().name).collect();
    tool_names.push(CONTEXT_DOCS_TOOL_NAME.to_string());
    let tool_names: Vec<&str> = tool_names.iter().map(String::as_str).collect();
    let allowed = build_allowed_tools(&tool_names, Some(S::NAME));

    let middleware: Vec<Arc<dyn AgentMiddleware>> = vec![
        Arc::new(GuardrailsMiddleware::new(
            deps.guardrails.clone(),
            allowed,
            deps.log.clone(),
        )),
        Arc::new(ContextDocsMiddleware),
        Arc::new(DynamicPromptMiddleware::new(blueprint.placeholders)),
    ];

    deps.log.info(
        "agent.built",
        &[
            ("agent", serde_json::json!(blueprint.name)),
            ("schema", serde_json::json!(S::NAME)),
        ],
    );
    Ok(build_agent(AgentSpec {
        name: blueprint.name.to_string(),
        model: Arc::clone(&deps.model),
        tools: deps.tools.clone(),
        system_prompt,
        middleware,
        response_format: Some(response_format_for::<S>()),
        max_iterations: deps.max_iterations,
        log: deps.log.clone(),
    }))
}
