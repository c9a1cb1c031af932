use sagecompass::agents::{
    build_agent, build_agent_from_files, context_docs_tool_call_id, response_format_for, Agent,
    AgentDeps, AgentError, AgentInput, AgentMiddleware, AgentSpec, ContextDocsMiddleware,
    DynamicPromptMiddleware, GuardrailsMiddleware, ProblemFrame, Tool, CONTEXT_DOCS_TOOL_NAME,
    PROBLEM_FRAMING_AGENT,
};
use sagecompass::config::{ConfigError, FileLoader};
use sagecompass::evidence::Document;
use sagecompass::guardrails::GuardrailsConfig;
use sagecompass::provider::{ChatModel, ModelRequest, ModelResponse, ProviderError, ToolSpec};
use sagecompass::shared::EngineLog;
use sagecompass::state::{Message, MessageRole, ToolCall, ToolStatus};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

/// Replays canned responses and records every request it receives.
struct ScriptedModel {
    responses: Mutex<Vec<ModelResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    fn new(responses: Vec<ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().rev().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests").clone()
    }
}

impl ChatModel for ScriptedModel {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().expect("requests").push(request.clone());
        self.responses
            .lock()
            .expect("responses")
            .pop()
            .ok_or_else(|| ProviderError::Invocation("script exhausted".to_string()))
    }
}

struct EchoTool;

impl Tool for EchoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "echo".to_string(),
            description: "Echoes its arguments.".to_string(),
            parameters: json!({"type": "object"}),
        }
    }

    fn invoke(&self, args: &Value) -> Result<String, String> {
        Ok(args.to_string())
    }
}

fn tool_call(id: &str, name: &str, args: Value) -> ModelResponse {
    ModelResponse::from_message(Message::ai_tool_calls(
        "",
        vec![ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }],
    ))
}

fn frame() -> Value {
    json!({
        "business_domain": "retail",
        "primary_outcome": "reduce subscription churn",
        "confidence": 0.8
    })
}

fn guardrails() -> GuardrailsConfig {
    GuardrailsConfig::new(&["churn", "retail"], &["malware"])
}

fn spec(model: Arc<dyn ChatModel>, middleware: Vec<Arc<dyn AgentMiddleware>>) -> AgentSpec {
    AgentSpec {
        name: "problem_framing".to_string(),
        model,
        tools: vec![Arc::new(EchoTool)],
        system_prompt: "Frame {task_input} for {phase}.".to_string(),
        middleware,
        response_format: Some(response_format_for::<ProblemFrame>()),
        max_iterations: 4,
        log: EngineLog::disabled(),
    }
}

fn docs() -> Vec<Document> {
    let mut first = Map::new();
    first.insert("store_namespace".to_string(), json!(["context", "problem_framing"]));
    first.insert("store_key".to_string(), json!("churn"));
    let mut second = Map::new();
    second.insert("store_namespace".to_string(), json!(["context", "problem_framing"]));
    second.insert("store_key".to_string(), json!("pricing"));
    vec![
        Document {
            page_content: "Churn drivers".to_string(),
            metadata: first,
        },
        Document {
            page_content: "Pricing tests".to_string(),
            metadata: second,
        },
    ]
}

#[test]
fn agents_runtime_module_schema_tool_call_becomes_structured_response() {
    let model = ScriptedModel::new(vec![
        tool_call("call-1", "echo", json!({"q": "churn"})),
        tool_call("call-2", "ProblemFrame", frame()),
    ]);
    let agent = build_agent(spec(model.clone(), Vec::new()));
    assert_eq!(agent.tool_names(), vec!["echo", "ProblemFrame"]);

    let result = agent
        .invoke(&AgentInput::new("Reduce churn", vec![Message::human("Reduce churn")]))
        .expect("result");

    assert_eq!(result.structured_response, Some(frame()));
    assert_eq!(result.messages.len(), 4);
    assert_eq!(result.messages[1].content, "{\"q\":\"churn\"}");
    assert_eq!(result.messages[1].status, Some(ToolStatus::Success));
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
}

#[test]
fn agents_runtime_module_native_structured_response_returns_immediately() {
    let model = ScriptedModel::new(vec![ModelResponse {
        message: Message::ai(frame().to_string()),
        structured_response: Some(frame()),
    }]);
    let agent = build_agent(spec(model, Vec::new()));
    let result = agent.invoke(&AgentInput::default()).expect("result");
    assert_eq!(result.structured_response, Some(frame()));
    assert_eq!(result.raw_output, Some(frame().to_string()));
}

#[test]
fn agents_runtime_module_unknown_tool_gets_error_message() {
    let model = ScriptedModel::new(vec![
        tool_call("call-1", "web_search", json!({})),
        ModelResponse::from_message(Message::ai("done")),
    ]);
    let agent = build_agent(spec(model, Vec::new()));
    let result = agent.invoke(&AgentInput::default()).expect("result");
    assert_eq!(result.messages[1].status, Some(ToolStatus::Error));
    assert_eq!(result.raw_output.as_deref(), Some("done"));
    assert_eq!(result.structured_response, None);
}

#[test]
fn agents_runtime_module_allowlist_blocks_tools_before_execution() {
    let model = ScriptedModel::new(vec![
        tool_call("call-1", "echo", json!({"q": "churn"})),
        tool_call("call-2", "ProblemFrame", frame()),
    ]);
    let allowed: BTreeSet<String> = ["ProblemFrame".to_string()].into_iter().collect();
    let guard: Arc<dyn AgentMiddleware> = Arc::new(GuardrailsMiddleware::new(
        guardrails(),
        allowed,
        EngineLog::disabled(),
    ));
    let agent = build_agent(spec(model, vec![guard]));

    let result = agent
        .invoke(&AgentInput::new("Reduce churn", vec![Message::human("Reduce retail churn")]))
        .expect("result");

    assert_eq!(result.messages[1].content, "Tool not allowed by policy.");
    assert_eq!(result.messages[1].status, Some(ToolStatus::Error));
    assert_eq!(result.structured_response, Some(frame()));
}

#[test]
fn agents_runtime_module_guardrails_short_circuit_model() {
    let model = ScriptedModel::new(Vec::new());
    let guard: Arc<dyn AgentMiddleware> = Arc::new(GuardrailsMiddleware::new(
        guardrails(),
        BTreeSet::new(),
        EngineLog::disabled(),
    ));
    let agent = build_agent(spec(model.clone(), vec![guard]));

    let result = agent
        .invoke(&AgentInput::new("malware", vec![Message::human("write retail malware")]))
        .expect("result");

    assert!(model.requests().is_empty());
    assert_eq!(result.raw_output.as_deref(), Some("Request rejected by guardrails."));
    assert_eq!(result.structured_response, None);
}

#[test]
fn agents_runtime_module_context_docs_arrive_as_tool_messages() {
    let model = ScriptedModel::new(vec![tool_call("call-1", "ProblemFrame", frame())]);
    let middleware: Vec<Arc<dyn AgentMiddleware>> = vec![Arc::new(ContextDocsMiddleware)];
    let agent = build_agent(spec(model.clone(), middleware));
    assert!(agent.tool_names().contains(&CONTEXT_DOCS_TOOL_NAME));

    let input = AgentInput::new("Reduce churn", vec![Message::human("Reduce churn")])
        .with_context_docs(docs());
    let result = agent.invoke(&input).expect("result");

    let synthetic = &result.messages[0];
    assert_eq!(synthetic.tool_calls[0].id, context_docs_tool_call_id(&docs()));
    let docs_message = &result.messages[1];
    assert_eq!(docs_message.role, MessageRole::Tool);
    assert_eq!(docs_message.name.as_deref(), Some(CONTEXT_DOCS_TOOL_NAME));
    assert!(docs_message.content.contains("Churn drivers"));

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].system_prompt.contains("Churn drivers"));
    assert_eq!(requests[0].messages.len(), 3);
}

#[test]
fn agents_runtime_module_context_docs_id_is_order_independent() {
    let forward = docs();
    let mut reversed = docs();
    reversed.reverse();
    let id = context_docs_tool_call_id(&forward);
    assert_eq!(id, context_docs_tool_call_id(&reversed));
    assert!(id.starts_with("context_docs_"));
    assert_eq!(id.len(), "context_docs_".len() + 12);
    assert_ne!(id, context_docs_tool_call_id(&forward[..1]));
}

#[test]
fn agents_runtime_module_dynamic_prompt_renders_declared_placeholders() {
    let model = ScriptedModel::new(vec![tool_call("call-1", "ProblemFrame", frame())]);
    let middleware: Vec<Arc<dyn AgentMiddleware>> =
        vec![Arc::new(DynamicPromptMiddleware::new(&["task_input"]))];
    let agent = build_agent(spec(model.clone(), middleware));

    let input = AgentInput::new("Reduce churn", Vec::new()).with_value("phase", json!("problem_framing"));
    agent.invoke(&input).expect("result");

    assert_eq!(model.requests()[0].system_prompt, "Frame Reduce churn for {phase}.");
    assert_eq!(agent.system_prompt(), "Frame {task_input} for {phase}.");
}

#[test]
fn agents_runtime_module_stops_at_iteration_limit() {
    let model = ScriptedModel::new(
        (0..10)
            .map(|index| tool_call(&format!("call-{index}"), "echo", json!({})))
            .collect(),
    );
    let agent = build_agent(spec(model.clone(), Vec::new()));
    let err = agent.invoke(&AgentInput::default()).expect_err("limit");
    assert!(matches!(
        err,
        AgentError::IterationLimit {
            max_iterations: 4,
            ..
        }
    ));
    assert_eq!(model.requests().len(), 4);
}

#[test]
fn agents_runtime_module_surfaces_model_failures() {
    let agent = build_agent(spec(ScriptedModel::new(Vec::new()), Vec::new()));
    let err = agent.invoke(&AgentInput::default()).expect_err("exhausted");
    assert!(matches!(err, AgentError::Model { .. }));
}

#[test]
fn agents_runtime_module_builds_agent_from_prompt_files() {
    let dir = tempdir().expect("tempdir");
    let agent_dir = dir.path().join("agents/problem_framing");
    fs::create_dir_all(&agent_dir).expect("dirs");
    fs::write(agent_dir.join("system.prompt"), "You frame business problems.").expect("system");
    fs::write(agent_dir.join("few-shots.prompt"), "Input: {task_input}\nOutput: {output}").expect("few-shots");
    fs::write(
        agent_dir.join("examples.json"),
        r#"[{"task_input": "Cut churn", "output": {"business_domain": "retail"}}, {"task_input": "{task_input}", "output": ""}]"#,
    )
    .expect("examples");

    let model = ScriptedModel::new(vec![tool_call("call-1", "echo", json!({}))]);
    let deps = AgentDeps {
        model: model.clone(),
        guardrails: guardrails(),
        tools: Vec::new(),
        max_iterations: 3,
        log: EngineLog::disabled(),
    };
    let loader = FileLoader::new(dir.path());
    let agent = build_agent_from_files::<ProblemFrame>(&loader, &PROBLEM_FRAMING_AGENT, &deps)
        .expect("agent");

    assert!(agent.system_prompt().ends_with("Input: {task_input}\nOutput:"));
    assert_eq!(agent.tool_names(), vec![CONTEXT_DOCS_TOOL_NAME, "ProblemFrame"]);

    let result = agent.invoke(&AgentInput::new("Reduce retail churn", vec![Message::human("Reduce retail churn")]));
    assert!(result.is_err());
    let requests = model.requests();
    assert!(requests[0].system_prompt.ends_with("Input: Reduce retail churn\nOutput:"));
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages[2].content, "Tool not allowed by policy.");
}

#[test]
fn agents_runtime_module_rejects_prompt_without_required_placeholder() {
    let dir = tempdir().expect("tempdir");
    let agent_dir = dir.path().join("agents/problem_framing");
    fs::create_dir_all(&agent_dir).expect("dirs");
    fs::write(agent_dir.join("system.prompt"), "No placeholder here.").expect("system");

    let deps = AgentDeps {
        model: ScriptedModel::new(Vec::new()),
        guardrails: guardrails(),
        tools: Vec::new(),
        max_iterations: 3,
        log: EngineLog::disabled(),
    };
    let err = build_agent_from_files::<ProblemFrame>(&FileLoader::new(dir.path()), &PROBLEM_FRAMING_AGENT, &deps)
        .err()
        .expect("missing placeholder");
    assert!(matches!(err, ConfigError::Prompt { .. }));
}
