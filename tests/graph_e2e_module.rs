use sagecompass::agents::{Agent, AgentError, AgentInput, AgentResult};
use sagecompass::config::{EngineSettings, FileLoader};
use sagecompass::evidence::{phase_namespace, EvidenceStore, InMemoryStore, StoredValue};
use sagecompass::graph::{
    assemble_from_files, build_sage_graph, Checkpointer, Command, GraphDeps, GraphError,
    InMemoryCheckpointer, Node, RunStatus, RunTracker, RuntimeContext, SageAgents, SageGraph,
    StateGraph, END,
};
use sagecompass::guardrails::GuardrailsConfig;
use sagecompass::nodes::{CHECKING_AMBIGUITIES_MESSAGE, UNABLE_TO_CLARIFY_MESSAGE};
use sagecompass::phases::{problem_framing_contract, PhaseRegistry, PROBLEM_FRAMING};
use sagecompass::provider::{ChatModel, ModelRequest, ModelResponse, ProviderError};
use sagecompass::shared::{EngineLog, ThreadId};
use sagecompass::state::{
    is_operational_text, Message, PhaseEntry, PhaseStatus, SageState,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const CHURN_REQUEST: &str = "Reduce churn for our retail subscription business";

/// Plays back `responses` in order and repeats the last one once exhausted.
/// `None` makes the call fail.
struct ScriptedAgent {
    responses: Vec<Option<Value>>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<AgentInput>>,
}

impl ScriptedAgent {
    fn new(responses: Vec<Option<Value>>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        })
    }

    fn always(response: Value) -> Arc<Self> {
        Self::new(vec![Some(response)])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, input: &AgentInput) -> Result<AgentResult, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().expect("inputs").push(input.clone());
        let index = call.min(self.responses.len().saturating_sub(1));
        match self.responses.get(index).cloned().flatten() {
            Some(value) => Ok(AgentResult {
                messages: Vec::new(),
                raw_output: Some(value.to_string()),
                structured_response: Some(value),
            }),
            None => Err(AgentError::IterationLimit {
                agent: "scripted".to_string(),
                max_iterations: 1,
            }),
        }
    }
}

fn frame() -> Value {
    json!({
        "business_domain": "retail",
        "primary_outcome": "Reduce subscription churn",
        "actors": ["subscribers", "retention team"],
        "current_pain": ["monthly cancellations"],
        "constraints": [],
        "confidence": 0.82
    })
}

fn no_ambiguities() -> Value {
    json!({"ambiguities": []})
}

fn channel_ambiguity() -> Value {
    json!({
        "ambiguities": [{
            "key": ["scope", "channels"],
            "description": "Sales channels are not stated",
            "clarifying_question": "Which sales channels are in scope?",
            "resolution_assumption": "All channels",
            "resolution_impact_direction": "+",
            "resolution_impact_value": 0.6,
            "importance": 0.95,
            "confidence": 0.93
        }]
    })
}

fn guardrails() -> GuardrailsConfig {
    GuardrailsConfig::new(
        &["churn", "retail", "subscription", "business"],
        &["weapon", "malware"],
    )
}

fn seeded_store() -> Arc<dyn EvidenceStore> {
    let store = InMemoryStore::new();
    store
        .put(
            &phase_namespace(PROBLEM_FRAMING),
            "retail-subscription-churn",
            StoredValue {
                title: "retail subscription churn".to_string(),
                text: "Monthly subscribers cancel after the second box.".to_string(),
                agents: vec![PROBLEM_FRAMING.to_string()],
                ..StoredValue::default()
            },
        )
        .expect("seed");
    Arc::new(store)
}

struct Harness {
    scan: Arc<ScriptedAgent>,
    clarify: Arc<ScriptedAgent>,
    framing: Arc<ScriptedAgent>,
    settings: EngineSettings,
    store: Option<Arc<dyn EvidenceStore>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Harness {
    fn new(scan: Arc<ScriptedAgent>, framing: Arc<ScriptedAgent>) -> Self {
        Self {
            scan,
            clarify: ScriptedAgent::always(json!({"responses": []})),
            framing,
            settings: EngineSettings::default(),
            store: None,
            checkpointer: None,
        }
    }

    fn build(&self) -> SageGraph {
        let mut registry = PhaseRegistry::new();
        registry
            .register(problem_framing_contract(self.framing.clone(), 8))
            .expect("register");
        build_sage_graph(GraphDeps {
            registry,
            guardrails: guardrails(),
            agents: SageAgents {
                ambiguity_scan: self.scan.clone(),
                ambiguity_clarification: self.clarify.clone(),
            },
            settings: self.settings.clone(),
            runtime: RuntimeContext::new(self.store.clone(), EngineLog::disabled()),
            checkpointer: self.checkpointer.clone(),
        })
        .expect("graph")
    }
}

fn human(text: &str) -> Vec<Message> {
    vec![Message::human(text)]
}

#[test]
fn graph_e2e_module_frames_retail_churn_with_evidence() {
    let mut harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::always(frame()),
    );
    harness.store = Some(seeded_store());
    let graph = harness.build();

    let outcome = graph.invoke(None, human(CHURN_REQUEST)).expect("run");

    assert_eq!(outcome.status, RunStatus::Complete);
    let entry = outcome.state.phase(PROBLEM_FRAMING).expect("phase entry");
    assert_eq!(entry.status, PhaseStatus::Complete);
    assert_eq!(entry.data["business_domain"], json!("retail"));
    assert_eq!(entry.version(), 1);
    assert_eq!(entry.evidence.len(), 1);
    assert_eq!(entry.evidence[0].key, "retail-subscription-churn");
    assert!(entry.ambiguity_checked);
    assert!(outcome.state.errors.is_empty());
    assert_eq!(outcome.replies(), vec![CHECKING_AMBIGUITIES_MESSAGE]);

    // The retrieved evidence triggers one rescan.
    assert_eq!(harness.scan.calls(), 2);
    assert_eq!(harness.framing.calls(), 1);
    let inputs = harness.framing.inputs.lock().expect("inputs");
    assert_eq!(inputs[0].task_input, CHURN_REQUEST);
    assert_eq!(inputs[0].context_docs.len(), 1);

    for name in ["guardrails_check", "ambiguity_supervisor", "retrieve_context", PROBLEM_FRAMING] {
        assert!(outcome.visited.iter().any(|visited| visited == name), "missing {name}");
    }
}

#[test]
fn graph_e2e_module_rejects_unsafe_requests_without_calling_agents() {
    let harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::always(frame()),
    );
    let graph = harness.build();

    let outcome = graph
        .invoke(None, human("Design a weapon for our retail business"))
        .expect("run");

    assert_eq!(outcome.status, RunStatus::Rejected);
    assert!(outcome.state.phases.is_empty());
    let replies = outcome.replies();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].starts_with("Request rejected:"));
    assert_eq!(harness.scan.calls(), 0);
    assert_eq!(harness.framing.calls(), 0);
    assert_eq!(
        outcome.state.gating.original_input,
        "Design a weapon for our retail business"
    );
    assert_eq!(outcome.state.gating.validate(), Ok(()));
}

#[test]
fn graph_e2e_module_keeps_operational_text_out_of_messages() {
    let mut harness = Harness::new(
        ScriptedAgent::always(channel_ambiguity()),
        ScriptedAgent::always(frame()),
    );
    harness.clarify = ScriptedAgent::always(json!({
        "responses": [{
            "clarified_input": "Online subscriptions only",
            "clarified_keys": [["scope", "channels"]],
            "clarification_output": "Understood, focusing on online subscriptions."
        }]
    }));
    harness.store = Some(seeded_store());
    let outcome = harness.build().invoke(None, human(CHURN_REQUEST)).expect("run");

    assert_eq!(outcome.status, RunStatus::Complete);
    assert!(!outcome.state.events.is_empty());
    for message in &outcome.state.messages {
        assert!(
            !is_operational_text(&message.content),
            "operational text leaked: {}",
            message.content
        );
    }
    assert_eq!(
        outcome.replies(),
        vec![
            CHECKING_AMBIGUITIES_MESSAGE,
            "Understood, focusing on online subscriptions."
        ]
    );
    assert_eq!(harness.clarify.calls(), 1);
}

#[test]
fn graph_e2e_module_reports_missing_store() {
    let harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::always(frame()),
    );
    let outcome = harness.build().invoke(None, human(CHURN_REQUEST)).expect("run");

    assert_eq!(outcome.status, RunStatus::Complete);
    let unavailable = outcome
        .state
        .errors
        .iter()
        .filter(|error| *error == "problem_framing: evidence store unavailable")
        .count();
    assert_eq!(unavailable, 1);
    let entry = outcome.state.phase(PROBLEM_FRAMING).expect("phase entry");
    assert!(entry.evidence.is_empty());
    assert!(entry.is_complete());
}

#[test]
fn graph_e2e_module_marks_downstream_phases_stale() {
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let thread_id = ThreadId::generate();
    let mut data = Map::new();
    data.insert("kpis".to_string(), json!(["churn rate"]));
    let mut goals = PhaseEntry::default();
    goals.data = data;
    goals.status = PhaseStatus::Complete;
    let goals = goals.with_snapshot();
    let mut seeded = SageState::default();
    seeded.phases.insert("goals_kpis".to_string(), goals);
    checkpointer.save(&thread_id, &seeded).expect("seed checkpoint");

    let mut harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::always(frame()),
    );
    harness.checkpointer = Some(checkpointer.clone());
    let outcome = harness
        .build()
        .invoke(Some(&thread_id), human(CHURN_REQUEST))
        .expect("run");

    assert_eq!(outcome.status, RunStatus::Complete);
    let goals = outcome.state.phase("goals_kpis").expect("goals entry");
    assert_eq!(goals.status, PhaseStatus::Stale);
    assert_eq!(goals.data["kpis"], json!(["churn rate"]));
    assert_eq!(goals.version(), 1);
    assert_eq!(checkpointer.checkpoint_count(&thread_id).expect("count"), 2);
}

#[test]
fn graph_e2e_module_resumes_completed_thread_without_rerunning_phase() {
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let mut harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::always(frame()),
    );
    harness.checkpointer = Some(checkpointer.clone());
    let graph = harness.build();

    let first = graph.invoke(None, human(CHURN_REQUEST)).expect("first run");
    let second = graph
        .invoke(Some(&first.thread_id), human("Thanks, that framing works."))
        .expect("second run");

    assert_eq!(second.thread_id, first.thread_id);
    assert_eq!(second.status, RunStatus::Complete);
    assert_eq!(harness.framing.calls(), 1);
    assert!(second.replies().is_empty());
    assert_eq!(second.run_messages().len(), 1);
    assert_eq!(
        second.state.messages.len(),
        first.state.messages.len() + 1
    );
    let saved = graph
        .thread_state(&first.thread_id)
        .expect("load")
        .expect("saved state");
    assert_eq!(saved, second.state);
    assert_eq!(checkpointer.thread_ids().expect("ids"), vec![first.thread_id.clone()]);
}

#[test]
fn graph_e2e_module_waits_for_user_clarification() {
    let mut harness = Harness::new(
        ScriptedAgent::always(channel_ambiguity()),
        ScriptedAgent::always(frame()),
    );
    harness.settings.hilp_enabled = true;
    let graph = harness.build();

    let first = graph.invoke(None, human(CHURN_REQUEST)).expect("first run");
    assert_eq!(first.status, RunStatus::AwaitingInput);
    assert_eq!(
        first.replies(),
        vec![
            CHECKING_AMBIGUITIES_MESSAGE,
            "Clarification needed: Which sales channels are in scope?"
        ]
    );
    assert_eq!(harness.framing.calls(), 0);
    assert_eq!(harness.clarify.calls(), 0);

    let second = graph
        .invoke(Some(&first.thread_id), human("Online only"))
        .expect("second run");
    assert_eq!(second.status, RunStatus::Complete);
    assert!(!second.state.ambiguity.awaiting_user);
    assert_eq!(
        second.state.ambiguity.resolved[0].clarified_input.as_deref(),
        Some("Online only")
    );
    assert_eq!(harness.scan.calls(), 1);
    assert_eq!(harness.framing.calls(), 1);
    let inputs = harness.framing.inputs.lock().expect("inputs");
    assert_eq!(inputs[0].task_input, "Online only");
}

#[test]
fn graph_e2e_module_stops_after_clarification_rounds_run_out() {
    let mut harness = Harness::new(
        ScriptedAgent::always(channel_ambiguity()),
        ScriptedAgent::always(frame()),
    );
    harness.settings.max_rounds = 2;
    let outcome = harness.build().invoke(None, human(CHURN_REQUEST)).expect("run");

    assert_eq!(outcome.status, RunStatus::Exhausted);
    assert_eq!(harness.clarify.calls(), 2);
    assert_eq!(harness.framing.calls(), 0);
    assert_eq!(outcome.state.ambiguity.clarification_round, 2);
    let unable = outcome
        .state
        .messages
        .iter()
        .filter(|message| message.content == UNABLE_TO_CLARIFY_MESSAGE)
        .count();
    assert_eq!(unable, 1);
    assert!(outcome.steps < harness.settings.max_graph_steps as usize);
}

#[test]
fn graph_e2e_module_halts_failed_phase_until_next_turn() {
    let harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::new(vec![None, Some(frame())]),
    );
    let graph = harness.build();

    let first = graph.invoke(None, human(CHURN_REQUEST)).expect("first run");
    assert_eq!(first.status, RunStatus::Halted);
    let entry = first.state.phase(PROBLEM_FRAMING).expect("failed entry");
    assert_eq!(entry.status, PhaseStatus::Stale);
    assert_eq!(entry.error_code(), Some("agent_invocation_failed"));
    assert_eq!(entry.error["turn"], json!(1));
    assert!(first
        .replies()
        .contains(&"Unable to finish problem framing right now. Please add more detail and try again."));
    assert_eq!(harness.framing.calls(), 1);

    let second = graph
        .invoke(Some(&first.thread_id), human("Retail subscription boxes, online only"))
        .expect("second run");
    assert_eq!(second.status, RunStatus::Complete);
    assert_eq!(harness.framing.calls(), 2);
    assert_eq!(harness.scan.calls(), 1);
    let entry = second.state.phase(PROBLEM_FRAMING).expect("entry");
    assert!(entry.is_complete());
    assert!(!entry.has_error());
}

#[test]
fn graph_e2e_module_streams_state_after_every_step() {
    let harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::always(frame()),
    );
    let streamed = harness
        .build()
        .stream(None, human(CHURN_REQUEST))
        .expect("stream");

    assert_eq!(streamed.snapshots.len(), streamed.outcome.steps);
    assert_eq!(streamed.outcome.visited.len(), streamed.outcome.steps);
    assert_eq!(streamed.snapshots.last(), Some(&streamed.outcome.state));
    assert!(streamed.snapshots[0].gating.guardrail.is_none());
    assert!(streamed.snapshots[1].gating.guardrail.is_some());
}

#[test]
fn graph_e2e_module_enforces_step_limit() {
    let mut harness = Harness::new(
        ScriptedAgent::always(no_ambiguities()),
        ScriptedAgent::always(frame()),
    );
    harness.settings.max_graph_steps = 3;
    let err = harness
        .build()
        .invoke(None, human(CHURN_REQUEST))
        .expect_err("step limit");
    assert!(matches!(err, GraphError::StepLimitExceeded { limit: 3, .. }));
}

struct RouteTo(&'static str);

impl Node for RouteTo {
    fn owner(&self) -> &str {
        "supervisor"
    }

    fn run(&self, _state: &SageState, _runtime: &RuntimeContext) -> Command {
        Command::goto(self.0)
    }
}

#[test]
fn graph_e2e_module_engine_hands_unknown_targets_to_parent() {
    let inner = StateGraph::new("inner", "b").add_node("b", Arc::new(RouteTo("c")));
    let graph = StateGraph::new("root", "a")
        .add_node("a", Arc::new(RouteTo("inner")))
        .add_subgraph(inner)
        .add_node("c", Arc::new(RouteTo(END)));
    graph.validate().expect("valid");

    let mut state = SageState::default();
    let mut tracker = RunTracker::new(10);
    graph
        .run(&mut state, &RuntimeContext::default(), &mut tracker)
        .expect("run");
    assert_eq!(tracker.visited(), ["a", "b", "c"]);
}

#[test]
fn graph_e2e_module_engine_rejects_unknown_root_targets() {
    let graph = StateGraph::new("root", "a").add_node("a", Arc::new(RouteTo("nowhere")));
    let err = graph
        .run(
            &mut SageState::default(),
            &RuntimeContext::default(),
            &mut RunTracker::new(10),
        )
        .expect_err("unknown target");
    assert!(matches!(err, GraphError::UnknownNode { ref target, .. } if target == "nowhere"));

    let missing = StateGraph::new("root", "absent");
    assert!(matches!(
        missing.validate(),
        Err(GraphError::MissingEntry { .. })
    ));
}

struct RouteWithUpdate;

impl Node for RouteWithUpdate {
    fn owner(&self) -> &str {
        "retrieve_context"
    }

    fn run(&self, _state: &SageState, _runtime: &RuntimeContext) -> Command {
        Command::end().with_update(
            sagecompass::state::StateUpdate::new()
                .with_ambiguity(sagecompass::state::AmbiguityContext::default()),
        )
    }
}

#[test]
fn graph_e2e_module_engine_rejects_unowned_writes() {
    let graph = StateGraph::new("root", "a").add_node("a", Arc::new(RouteWithUpdate));
    let mut state = SageState::default();
    let err = graph
        .run(&mut state, &RuntimeContext::default(), &mut RunTracker::new(10))
        .expect_err("ownership violation");
    assert!(matches!(err, GraphError::InvalidUpdate { ref node, .. } if node == "a"));
    assert_eq!(state, SageState::default());
}

/// Answers by requested output schema, the way a provider with native
/// structured output would.
struct SchemaModel {
    calls: AtomicUsize,
}

impl ChatModel for SchemaModel {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = request
            .response_format
            .as_ref()
            .map(|format| format.name.as_str())
            .ok_or_else(|| ProviderError::Invocation("no response format".to_string()))?;
        let structured = match name {
            "ProblemFrame" => frame(),
            "AmbiguityScan" => no_ambiguities(),
            _ => json!({"responses": []}),
        };
        Ok(ModelResponse {
            message: Message::ai(structured.to_string()),
            structured_response: Some(structured),
        })
    }
}

#[test]
fn graph_e2e_module_assembles_from_shipped_resources() {
    let loader = FileLoader::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("resources"));
    let store = InMemoryStore::new();
    for (key, value) in loader
        .load_context_documents(PROBLEM_FRAMING)
        .expect("context documents")
    {
        store
            .put(&phase_namespace(PROBLEM_FRAMING), &key, value)
            .expect("seed");
    }
    let model = Arc::new(SchemaModel {
        calls: AtomicUsize::new(0),
    });
    let requested = Mutex::new(Vec::new());
    let graph = assemble_from_files(
        &loader,
        |agent| {
            requested.lock().expect("requested").push(agent.to_string());
            let model: Arc<dyn ChatModel> = model.clone();
            Ok(model)
        },
        Some(Arc::new(store)),
    )
    .expect("assemble");

    assert_eq!(graph.registry().names(), vec![PROBLEM_FRAMING]);
    assert_eq!(requested.lock().expect("requested").len(), 3);

    let outcome = graph.invoke(None, human(CHURN_REQUEST)).expect("run");
    assert_eq!(outcome.status, RunStatus::Complete);
    let entry = outcome.state.phase(PROBLEM_FRAMING).expect("entry");
    assert_eq!(entry.data["business_domain"], json!("retail"));
    assert!(!entry.evidence.is_empty());
    assert!(model.calls.load(Ordering::SeqCst) >= 2);
}

fn clarification_reply(resolves: Option<bool>) -> Option<Value> {
    resolves.map(|resolves| {
        if resolves {
            json!({
                "responses": [{
                    "clarified_input": "Online subscriptions only",
                    "clarified_keys": [["scope", "channels"]],
                    "clarification_output": "Focusing on online subscriptions."
                }]
            })
        } else {
            json!({"responses": []})
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn graph_e2e_module_preflight_loops_stay_bounded(
        replies in proptest::collection::vec(proptest::option::of(any::<bool>()), 1..6),
        max_rounds in 1u32..5,
        retrieval_rounds in 0u32..3,
        with_store in any::<bool>(),
    ) {
        let mut harness = Harness::new(
            ScriptedAgent::always(channel_ambiguity()),
            ScriptedAgent::always(frame()),
        );
        harness.clarify = ScriptedAgent::new(replies.iter().copied().map(clarification_reply).collect());
        harness.settings.max_rounds = max_rounds;
        harness.settings.max_context_retrieval_rounds = retrieval_rounds;
        if with_store {
            harness.store = Some(seeded_store());
        }

        let outcome = harness.build().invoke(None, human(CHURN_REQUEST)).expect("run");

        let reply_at = |call: usize| replies[call.min(replies.len() - 1)];
        let resolved_at = (0..max_rounds as usize).find(|call| reply_at(*call) == Some(true));
        match resolved_at {
            Some(call) => {
                prop_assert_eq!(outcome.status, RunStatus::Complete);
                prop_assert_eq!(harness.clarify.calls(), call + 1);
            }
            None => {
                prop_assert_eq!(outcome.status, RunStatus::Exhausted);
                prop_assert_eq!(harness.clarify.calls(), max_rounds as usize);
            }
        }
        prop_assert!(harness.clarify.calls() <= max_rounds as usize);
        prop_assert!(harness.scan.calls() <= 1 + retrieval_rounds as usize);
        prop_assert!(harness.scan.calls() >= 1);
    }
}
