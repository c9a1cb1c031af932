use super::{trace, GUARDRAILS_CHECK, SUPERVISOR};
use crate::graph::{Command, Node, RuntimeContext};
use crate::state::{EventKind, SageState};
use serde_json::json;

pub struct PhaseSupervisorNode {
    phase: String,
}

impl PhaseSupervisorNode {
    pub fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
        }
    }
}

impl Node for PhaseSupervisorNode {
    fn owner(&self) -> &str {
        "phase_supervisor"
    }

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command {
        let phase = self.phase.as_str();
        if !state.gating.guardrails_ran() {
            return Command::goto(GUARDRAILS_CHECK).with_update(trace(
                self.owner(),
                EventKind::Routing,
                "Guardrails have not run; routing to guardrails check.",
                Some(phase),
                &[],
            ));
        }

        let ready = state
            .phase(phase)
            .is_some_and(|entry| entry.is_complete() && entry.has_data());
        if !ready {
            runtime
                .log
                .info("phase_supervisor.run_phase", &[("phase", json!(phase))]);
            return Command::goto(phase).with_update(trace(
                self.owner(),
                EventKind::Progress,
                &format!("Running phase {phase}."),
                Some(phase),
                &[],
            ));
        }

        Command::goto(SUPERVISOR).with_update(trace(
            self.owner(),
            EventKind::Progress,
            &format!("Phase {phase} complete."),
            Some(phase),
            &[],
        ))
    }
}
