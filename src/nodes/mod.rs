//! Graph nodes. Each node reads the pre-step state and returns a [`Command`]
//! whose update only touches the fields its owner may write.
//!
//! [`Command`]: crate::graph::Command

pub mod ambiguity_scan;
pub mod ambiguity_supervisor;
pub mod clarification;
pub mod gating;
pub mod phase_body;
pub mod phase_supervisor;
pub mod retrieve_context;
pub mod supervisor;

pub use ambiguity_scan::{select_ambiguities, AmbiguityScanNode, ScanThresholds};
pub use ambiguity_supervisor::AmbiguitySupervisorNode;
pub use clarification::{
    normalize_clarification_responses, AmbiguityClarificationNode, ExternalClarificationNode,
};
pub use gating::GatingGuardrailsNode;
pub use phase_body::PhaseNode;
pub use phase_supervisor::PhaseSupervisorNode;
pub use retrieve_context::RetrieveContextNode;
pub use supervisor::SupervisorNode;

use crate::events::{emit_event, event_data};
use crate::state::{EventKind, StateUpdate};
use serde_json::Value;

pub const SUPERVISOR: &str = "supervisor";
pub const GUARDRAILS_CHECK: &str = "guardrails_check";
pub const AMBIGUITY_CHECK: &str = "ambiguity_check";
pub const AMBIGUITY_SUPERVISOR: &str = "ambiguity_supervisor";
pub const AMBIGUITY_SCAN: &str = "ambiguity_scan";
pub const RETRIEVE_CONTEXT: &str = "retrieve_context";
pub const AMBIGUITY_CLARIFICATION: &str = "ambiguity_clarification";
pub const AMBIGUITY_CLARIFICATION_EXTERNAL: &str = "ambiguity_clarification_external";
pub const PHASE_SUPERVISOR: &str = "phase_supervisor";

pub const CHECKING_AMBIGUITIES_MESSAGE: &str = "Checking for ambiguities.";
pub const UNABLE_TO_CLARIFY_MESSAGE: &str = "Unable to clarify the request.";

fn trace(
    owner: &str,
    kind: EventKind,
    message: &str,
    phase: Option<&str>,
    fields: &[(&str, Value)],
) -> StateUpdate {
    let data = (!fields.is_empty()).then(|| event_data(fields));
    emit_event(owner, kind, message, phase, data)
}
