use crate::state::{PhaseEntry, PhaseStatus};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub const PHASE_DEPENDENCIES: &[(&str, &[&str])] = &[
    (
        "problem_framing",
        &["goals_kpis", "feasibility", "decision_synthesis"],
    ),
    ("goals_kpis", &["feasibility", "decision_synthesis"]),
    ("feasibility", &["decision_synthesis"]),
    ("decision_synthesis", &[]),
];

pub fn phase_dependents(phase: &str) -> &'static [&'static str] {
    PHASE_DEPENDENCIES
        .iter()
        .find(|(name, _)| *name == phase)
        .map(|(_, dependents)| *dependents)
        .unwrap_or(&[])
}

pub fn is_known_phase(phase: &str) -> bool {
    PHASE_DEPENDENCIES.iter().any(|(name, _)| *name == phase)
}

/// Transitive closure of `phase`'s dependents, excluding `phase` itself.
pub fn get_phases_to_invalidate(phase: &str) -> BTreeSet<String> {
    let mut closure = BTreeSet::new();
    let mut queue: VecDeque<&str> = phase_dependents(phase).iter().copied().collect();
    while let Some(next) = queue.pop_front() {
        if next == phase || !closure.insert(next.to_string()) {
            continue;
        }
        queue.extend(phase_dependents(next).iter().copied());
    }
    closure
}

pub fn invalidate_downstream_phases(
    phases: &BTreeMap<String, PhaseEntry>,
    changed_phase: &str,
) -> BTreeMap<String, PhaseEntry> {
    let targets = get_phases_to_invalidate(changed_phase);
    phases
        .iter()
        .map(|(name, entry)| {
            let entry = if targets.contains(name) {
                entry.with_status(PhaseStatus::Stale)
            } else {
                entry.clone()
            };
            (name.clone(), entry)
        })
        .collect()
}
