use super::{
    Checkpointer, GraphError, InMemoryCheckpointer, RunTracker, RuntimeContext, StateGraph,
};
use crate::agents::{
    build_agent_from_files, Agent, AgentBlueprint, AgentDeps, AmbiguityScanOutput, ClarificationOutput,
    ContextLookupTool, ProblemFrame, Tool, AMBIGUITY_CLARIFICATION_AGENT, AMBIGUITY_SCAN_AGENT,
    PROBLEM_FRAMING_AGENT,
};
use crate::config::{ConfigError, EngineSettings, FileLoader};
use crate::evidence::EvidenceStore;
use crate::guardrails::GuardrailsConfig;
use crate::nodes::{
    AmbiguityClarificationNode, AmbiguityScanNode, AmbiguitySupervisorNode,
    ExternalClarificationNode, GatingGuardrailsNode, RetrieveContextNode, ScanThresholds,
    SupervisorNode, AMBIGUITY_CHECK, AMBIGUITY_CLARIFICATION, AMBIGUITY_CLARIFICATION_EXTERNAL,
    AMBIGUITY_SCAN, AMBIGUITY_SUPERVISOR, GUARDRAILS_CHECK, RETRIEVE_CONTEXT, SUPERVISOR,
};
use crate::phases::{problem_framing_contract, PhaseRegistry, RegistryError, PROBLEM_FRAMING};
use crate::provider::{ChatModel, ProviderError};
use crate::shared::{EngineLog, ThreadId};
use crate::state::{Message, SageState};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

pub const ROOT_GRAPH_NAME: &str = "sagecompass";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    AwaitingInput,
    Rejected,
    Exhausted,
    Halted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::AwaitingInput => "awaiting_input",
            Self::Rejected => "rejected",
            Self::Exhausted => "exhausted",
            Self::Halted => "halted",
        }
    }

    fn from_state(state: &SageState, registry: &PhaseRegistry) -> Self {
        if state
            .gating
            .guardrail
            .as_ref()
            .is_some_and(|guardrail| !guardrail.passed())
        {
            return Self::Rejected;
        }
        if registry.all_complete(state) {
            return Self::Complete;
        }
        if state.ambiguity.awaiting_user {
            return Self::AwaitingInput;
        }
        if state.ambiguity.exhausted {
            return Self::Exhausted;
        }
        Self::Halted
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub thread_id: ThreadId,
    pub state: SageState,
    pub status: RunStatus,
    pub steps: usize,
    pub visited: Vec<String>,
    first_new_message: usize,
}

impl RunOutcome {
    pub fn run_messages(&self) -> &[Message] {
        self.state
            .messages
            .get(self.first_new_message..)
            .unwrap_or_default()
    }

    pub fn replies(&self) -> Vec<&str> {
        self.run_messages()
            .iter()
            .filter(|message| message.is_ai() && message.tool_calls.is_empty())
            .map(|message| message.content.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamedRun {
    pub outcome: RunOutcome,
    pub snapshots: Vec<SageState>,
}

#[derive(Clone)]
pub struct SageAgents {
    pub ambiguity_scan: Arc<dyn Agent>,
    pub ambiguity_clarification: Arc<dyn Agent>,
}

pub struct GraphDeps {
    pub registry: PhaseRegistry,
    pub guardrails: GuardrailsConfig,
    pub agents: SageAgents,
    pub settings: EngineSettings,
    pub runtime: RuntimeContext,
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
}

pub struct SageGraph {
    graph: StateGraph,
    registry: Arc<PhaseRegistry>,
    runtime: RuntimeContext,
    checkpointer: Arc<dyn Checkpointer>,
    max_steps: usize,
}

fn ambiguity_graph(deps: &GraphDeps, registry: &Arc<PhaseRegistry>) -> StateGraph {
    let settings = &deps.settings;
    let thresholds = ScanThresholds {
        importance: settings.importance_threshold,
        confidence: settings.confidence_threshold,
        max_selected: settings.max_selected_ambiguities,
    };
    StateGraph::new(AMBIGUITY_CHECK, AMBIGUITY_SUPERVISOR)
        .add_node(
            AMBIGUITY_SUPERVISOR,
            Arc::new(AmbiguitySupervisorNode::new(
                Arc::clone(registry),
                settings.max_rounds,
                settings.max_context_retrieval_rounds,
            )),
        )
        .add_node(
            AMBIGUITY_SCAN,
            Arc::new(AmbiguityScanNode::new(
                Arc::clone(&deps.agents.ambiguity_scan),
                thresholds,
                settings.scan_context_items,
            )),
        )
        .add_node(
            RETRIEVE_CONTEXT,
            Arc::new(RetrieveContextNode::new(settings.retrieval_limit)),
        )
        .add_node(
            AMBIGUITY_CLARIFICATION,
            Arc::new(AmbiguityClarificationNode::new(
                Arc::clone(&deps.agents.ambiguity_clarification),
                settings.max_rounds,
            )),
        )
        .add_node(
            AMBIGUITY_CLARIFICATION_EXTERNAL,
            Arc::new(ExternalClarificationNode::new(settings.max_rounds)),
        )
}

pub fn build_sage_graph(deps: GraphDeps) -> Result<SageGraph, GraphError> {
    let registry = Arc::new(deps.registry.clone());
    let mut graph = StateGraph::new(ROOT_GRAPH_NAME, SUPERVISOR)
        .add_node(
            SUPERVISOR,
            Arc::new(SupervisorNode::new(
                Arc::clone(&registry),
                deps.settings.hilp_enabled,
            )),
        )
        .add_node(
            GUARDRAILS_CHECK,
            Arc::new(GatingGuardrailsNode::new(deps.guardrails.clone())),
        )
        .add_subgraph(ambiguity_graph(&deps, &registry));
    for contract in registry.iter() {
        graph = graph.add_subgraph(contract.build_graph());
    }
    graph.validate()?;

    deps.runtime.log.info(
        "graph.built",
        &[("phases", json!(registry.names())), ("nodes", json!(graph.node_names()))],
    );
    Ok(SageGraph {
        graph,
        registry,
        runtime: deps.runtime,
        checkpointer: deps
            .checkpointer
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointer::new())),
        max_steps: deps.settings.max_graph_steps as usize,
    })
}

impl SageGraph {
    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    pub fn invoke(
        &self,
        thread_id: Option<&ThreadId>,
        input: Vec<Message>,
    ) -> Result<RunOutcome, GraphError> {
        self.run_thread(thread_id, input, RunTracker::new(self.max_steps))
            .map(|streamed| streamed.outcome)
    }

    pub fn stream(
        &self,
        thread_id: Option<&ThreadId>,
        input: Vec<Message>,
    ) -> Result<StreamedRun, GraphError> {
        self.run_thread(thread_id, input, RunTracker::recording(self.max_steps))
    }

    pub fn thread_state(&self, thread_id: &ThreadId) -> Result<Option<SageState>, GraphError> {
        self.checkpointer.load(thread_id)
    }

    fn run_thread(
        &self,
        thread_id: Option<&ThreadId>,
        input: Vec<Message>,
        mut tracker: RunTracker,
    ) -> Result<StreamedRun, GraphError> {
        let thread_id = thread_id.cloned().unwrap_or_else(ThreadId::generate);
        let mut state = self.checkpointer.load(&thread_id)?.unwrap_or_default();
        let first_new_message = state.messages.len();
        state.messages.extend(input);

        self.runtime
            .log
            .info("run.started", &[("thread_id", json!(thread_id.as_str()))]);
        self.graph.run(&mut state, &self.runtime, &mut tracker)?;
        self.checkpointer.save(&thread_id, &state)?;

        let status = RunStatus::from_state(&state, &self.registry);
        let (steps, visited, snapshots) = tracker.into_parts();
        self.runtime.log.info(
            "run.finished",
            &[
                ("thread_id", json!(thread_id.as_str())),
                ("status", json!(status.as_str())),
                ("steps", json!(steps)),
            ],
        );
        Ok(StreamedRun {
            outcome: RunOutcome {
                thread_id,
                state,
                status,
                steps,
                visited,
                first_new_message,
            },
            snapshots,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub fn assemble_from_files<F>(
    loader: &FileLoader,
    models: F,
    store: Option<Arc<dyn EvidenceStore>>,
) -> Result<SageGraph, AssemblyError>
where
    F: Fn(&str) -> Result<Arc<dyn ChatModel>, AssemblyError>,
{
    let settings = loader.load_engine_settings()?;
    let guardrails = loader
        .load_guardrails_config()?
        .ok_or_else(|| ConfigError::MissingFile {
            path: loader.layout().guardrails_path().display().to_string(),
        })?;
    let log = settings
        .log_path
        .as_ref()
        .map_or_else(EngineLog::disabled, |path| EngineLog::to_file(path.clone()));

    let lookup: Arc<dyn Tool> = Arc::new(ContextLookupTool::new(
        store.clone(),
        PROBLEM_FRAMING,
        settings.retrieval_limit,
    ));
    let deps_for = |blueprint: &AgentBlueprint, tools: Vec<Arc<dyn Tool>>| {
        models(blueprint.name).map(|model| AgentDeps {
            model,
            guardrails: guardrails.clone(),
            tools,
            max_iterations: settings.max_agent_iterations,
            log: log.clone(),
        })
    };

    let framing: Arc<dyn Agent> = Arc::new(build_agent_from_files::<ProblemFrame>(
        loader,
        &PROBLEM_FRAMING_AGENT,
        &deps_for(&PROBLEM_FRAMING_AGENT, vec![lookup])?,
    )?);
    let agents = SageAgents {
        ambiguity_scan: Arc::new(build_agent_from_files::<AmbiguityScanOutput>(
            loader,
            &AMBIGUITY_SCAN_AGENT,
            &deps_for(&AMBIGUITY_SCAN_AGENT, Vec::new())?,
        )?),
        ambiguity_clarification: Arc::new(build_agent_from_files::<ClarificationOutput>(
            loader,
            &AMBIGUITY_CLARIFICATION_AGENT,
            &deps_for(&AMBIGUITY_CLARIFICATION_AGENT, Vec::new())?,
        )?),
    };

    let mut registry = PhaseRegistry::new();
    registry.register(problem_framing_contract(framing, settings.max_context_items))?;

    Ok(build_sage_graph(GraphDeps {
        registry,
        guardrails,
        agents,
        runtime: RuntimeContext::new(store, log),
        settings,
        checkpointer: None,
    })?)
}
