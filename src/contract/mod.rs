pub mod error;
pub mod phases;
pub mod prompts;
pub mod state;
pub mod structured_output;
pub mod tools;

pub use error::ContractError;
pub use phases::{
    get_phases_to_invalidate, invalidate_downstream_phases, is_known_phase, phase_dependents,
    PHASE_DEPENDENCIES,
};
pub use prompts::{
    compose_agent_prompt, render_placeholders, validate_examples, validate_prompt_placeholders,
    validate_prompt_suffix_order, PromptExample, TASK_INPUT_PLACEHOLDER,
};
pub use state::{
    owner_groups, validate_raw_state_update, validate_state_update, StateOwnershipRule,
    GRAPH_NODE_OWNERS, STATE_OWNERSHIP_RULES,
};
pub use structured_output::{extract_structured_response, parse_structured, OutputSchema};
pub use tools::build_allowed_tools;
