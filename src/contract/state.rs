//! Ownership contract for `SageState` top-level fields.
//!
//! Owners are node names or one of the groups `nodes` (every graph node),
//! `phase_nodes` (phase body nodes, named after their phase) and
//! `middleware` (agent middleware).

use super::phases::is_known_phase;
use super::ContractError;
use crate::state::{StateUpdate, PHASE_STATUS_VALUES, SAGE_STATE_FIELDS};
use serde_json::{Map, Value};

pub const OWNER_GROUP_NODES: &str = "nodes";
pub const OWNER_GROUP_PHASE_NODES: &str = "phase_nodes";
pub const OWNER_GROUP_MIDDLEWARE: &str = "middleware";

pub const GRAPH_NODE_OWNERS: &[&str] = &[
    "supervisor",
    "gating_guardrails",
    "ambiguity_supervisor",
    "ambiguity_scan",
    "retrieve_context",
    "ambiguity_clarification",
    "ambiguity_clarification_external",
    "phase_supervisor",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateOwnershipRule {
    pub field: &'static str,
    pub owners: &'static [&'static str],
    pub invariant: &'static str,
}

pub const STATE_OWNERSHIP_RULES: &[StateOwnershipRule] = &[
    StateOwnershipRule {
        field: "gating",
        owners: &["gating_guardrails"],
        invariant: "GatingContext holds guardrail metadata only.",
    },
    StateOwnershipRule {
        field: "ambiguity",
        owners: &[
            "supervisor",
            "ambiguity_supervisor",
            "ambiguity_scan",
            "ambiguity_clarification",
            "ambiguity_clarification_external",
        ],
        invariant: "AmbiguityContext holds ambiguity detection and clarification only.",
    },
    StateOwnershipRule {
        field: "messages",
        owners: &[OWNER_GROUP_NODES, OWNER_GROUP_MIDDLEWARE],
        invariant: "Messages append only; no operational strings.",
    },
    StateOwnershipRule {
        field: "phases",
        owners: &[
            OWNER_GROUP_PHASE_NODES,
            "phase_supervisor",
            "retrieve_context",
            "ambiguity_scan",
        ],
        invariant: "PhaseEntry status must be pending|complete|stale.",
    },
    StateOwnershipRule {
        field: "errors",
        owners: &[OWNER_GROUP_NODES],
        invariant: "Errors are append-only short summaries.",
    },
    StateOwnershipRule {
        field: "events",
        owners: &[OWNER_GROUP_NODES, OWNER_GROUP_MIDDLEWARE],
        invariant: "Events append only, deduplicated by uid.",
    },
];

pub fn ownership_rule(field: &str) -> Option<&'static StateOwnershipRule> {
    STATE_OWNERSHIP_RULES.iter().find(|rule| rule.field == field)
}

pub fn owner_groups(owner: &str) -> Vec<&'static str> {
    let mut groups = Vec::new();
    let is_phase_node = is_known_phase(owner);
    if is_phase_node || GRAPH_NODE_OWNERS.contains(&owner) {
        groups.push(OWNER_GROUP_NODES);
    }
    if is_phase_node {
        groups.push(OWNER_GROUP_PHASE_NODES);
    }
    if owner == OWNER_GROUP_MIDDLEWARE {
        groups.push(OWNER_GROUP_MIDDLEWARE);
    }
    groups
}

fn is_owner_allowed(rule: &StateOwnershipRule, owner: &str) -> bool {
    rule.owners.contains(&owner)
        || owner_groups(owner)
            .iter()
            .any(|group| rule.owners.contains(group))
}

fn check_fields<'a>(
    fields: impl IntoIterator<Item = &'a str>,
    owner: &str,
) -> Result<(), ContractError> {
    let fields: Vec<&str> = fields.into_iter().collect();
    let mut unknown: Vec<String> = fields
        .iter()
        .filter(|field| !SAGE_STATE_FIELDS.contains(*field))
        .map(|field| (*field).to_string())
        .collect();
    if !unknown.is_empty() {
        unknown.sort();
        return Err(ContractError::UnknownFields { fields: unknown });
    }
    for field in fields {
        let Some(rule) = ownership_rule(field) else {
            return Err(ContractError::UnknownFields {
                fields: vec![field.to_string()],
            });
        };
        if !is_owner_allowed(rule, owner) {
            return Err(ContractError::OwnershipViolation {
                field: field.to_string(),
                owner: owner.to_string(),
                allowed: rule.owners.iter().map(|name| (*name).to_string()).collect(),
            });
        }
    }
    Ok(())
}

pub fn validate_state_update(update: &StateUpdate, owner: &str) -> Result<(), ContractError> {
    check_fields(update.touched_fields(), owner)?;
    if let Some(phases) = &update.phases {
        if let Some(name) = phases.keys().find(|name| name.trim().is_empty()) {
            return Err(ContractError::MalformedPhase {
                phase: name.clone(),
                reason: "phase name must be non-empty".to_string(),
            });
        }
    }
    Ok(())
}

pub fn validate_raw_state_update(
    update: &Map<String, Value>,
    owner: &str,
) -> Result<(), ContractError> {
    check_fields(update.keys().map(String::as_str), owner)?;
    let Some(phases) = update.get("phases") else {
        return Ok(());
    };
    let Some(phases) = phases.as_object() else {
        return Err(ContractError::MalformedPhase {
            phase: "*".to_string(),
            reason: "phases must be an object keyed by phase name".to_string(),
        });
    };
    for (phase, entry) in phases {
        let Some(entry) = entry.as_object() else {
            return Err(ContractError::MalformedPhase {
                phase: phase.clone(),
                reason: "phase entry must be an object".to_string(),
            });
        };
        match entry.get("status") {
            None => {}
            Some(Value::String(status)) if PHASE_STATUS_VALUES.contains(&status.as_str()) => {}
            Some(other) => {
                return Err(ContractError::InvalidPhaseStatus {
                    phase: phase.clone(),
                    status: other.as_str().map_or_else(|| other.to_string(), str::to_string),
                })
            }
        }
    }
    Ok(())
}
