pub mod ambiguity;
pub mod gating;
pub mod messages;
pub mod phase;
pub mod sage;
pub mod trace;

pub use ambiguity::{
    format_ambiguity_key, AmbiguityContext, AmbiguityItem, AmbiguityKey, ClarificationResponse,
    ImpactDirection,
};
pub use gating::{GatingContext, GatingDecision, GuardrailResult};
pub use messages::{
    build_llm_messages, count_human_messages, is_latest_message_human, is_operational_text,
    latest_user_input, Message, MessageRole, ToolCall, ToolStatus,
};
pub use phase::{EvidenceItem, PhaseEntry, PhaseSnapshot, PhaseStatus, PHASE_STATUS_VALUES};
pub use sage::{SageState, StateUpdate, SAGE_STATE_FIELDS};
pub use trace::{EventKind, TraceEvent};
