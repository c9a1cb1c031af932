use super::{AmbiguityContext, GatingContext, Message, PhaseEntry, TraceEvent};
use crate::events::add_events;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SAGE_STATE_FIELDS: [&str; 6] =
    ["gating", "ambiguity", "messages", "phases", "errors", "events"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SageState {
    #[serde(default)]
    pub gating: GatingContext,
    #[serde(default)]
    pub ambiguity: AmbiguityContext,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseEntry>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub events: Vec<TraceEvent>,
}

impl SageState {
    pub fn from_user_input(text: &str) -> Self {
        Self {
            messages: vec![Message::human(text)],
            ..Self::default()
        }
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseEntry> {
        self.phases.get(name)
    }

    /// Applies an update with the field reducers: `messages` and `errors` append,
    /// `events` dedupe by uid, `phases` merge per key, the contexts replace.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(gating) = update.gating {
            self.gating = gating;
        }
        if let Some(ambiguity) = update.ambiguity {
            self.ambiguity = ambiguity;
        }
        self.messages.extend(update.messages);
        if let Some(phases) = update.phases {
            self.phases.extend(phases);
        }
        self.errors.extend(update.errors);
        if !update.events.is_empty() {
            self.events = add_events(&self.events, &update.events);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub gating: Option<GatingContext>,
    pub ambiguity: Option<AmbiguityContext>,
    pub messages: Vec<Message>,
    pub phases: Option<BTreeMap<String, PhaseEntry>>,
    pub errors: Vec<String>,
    pub events: Vec<TraceEvent>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gating(mut self, gating: GatingContext) -> Self {
        self.gating = Some(gating);
        self
    }

    pub fn with_ambiguity(mut self, ambiguity: AmbiguityContext) -> Self {
        self.ambiguity = Some(ambiguity);
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_phase(mut self, name: &str, entry: PhaseEntry) -> Self {
        self.phases
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), entry);
        self
    }

    pub fn with_phases(mut self, phases: BTreeMap<String, PhaseEntry>) -> Self {
        self.phases.get_or_insert_with(BTreeMap::new).extend(phases);
        self
    }

    pub fn with_error(mut self, summary: impl Into<String>) -> Self {
        self.errors.push(summary.into());
        self
    }

    pub fn with_events(mut self, events: Vec<TraceEvent>) -> Self {
        self.events = add_events(&self.events, &events);
        self
    }

    pub fn merge(mut self, other: StateUpdate) -> Self {
        if other.gating.is_some() {
            self.gating = other.gating;
        }
        if other.ambiguity.is_some() {
            self.ambiguity = other.ambiguity;
        }
        self.messages.extend(other.messages);
        if let Some(phases) = other.phases {
            self = self.with_phases(phases);
        }
        self.errors.extend(other.errors);
        self.with_events(other.events)
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }

    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.gating.is_some() {
            fields.push("gating");
        }
        if self.ambiguity.is_some() {
            fields.push("ambiguity");
        }
        if !self.messages.is_empty() {
            fields.push("messages");
        }
        if self.phases.is_some() {
            fields.push("phases");
        }
        if !self.errors.is_empty() {
            fields.push("errors");
        }
        if !self.events.is_empty() {
            fields.push("events");
        }
        fields
    }

    /// Update that turns `before` into `after`, assuming `after` only grew the append-only lists.
    pub fn diff(before: &SageState, after: &SageState) -> Self {
        let changed_phases: BTreeMap<String, PhaseEntry> = after
            .phases
            .iter()
            .filter(|(name, entry)| before.phases.get(*name) != Some(*entry))
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();
        Self {
            gating: (after.gating != before.gating).then(|| after.gating.clone()),
            ambiguity: (after.ambiguity != before.ambiguity).then(|| after.ambiguity.clone()),
            messages: after
                .messages
                .get(before.messages.len()..)
                .unwrap_or_default()
                .to_vec(),
            phases: (!changed_phases.is_empty()).then_some(changed_phases),
            errors: after
                .errors
                .get(before.errors.len()..)
                .unwrap_or_default()
                .to_vec(),
            events: after.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emit_event;
    use crate::state::EventKind;

    #[test]
    fn diff_reapplied_to_parent_does_not_duplicate_events() {
        let mut parent = SageState::from_user_input("hello");
        parent.apply(emit_event("supervisor", EventKind::Routing, "start", None, None));
        let mut child = parent.clone();
        child.apply(
            emit_event("ambiguity_scan", EventKind::Progress, "scanned", None, None)
                .with_message(Message::ai("Which region?")),
        );

        let update = StateUpdate::diff(&parent, &child);
        parent.apply(update);

        assert_eq!(parent.events.len(), 2);
        assert_eq!(parent.messages.len(), 2);
        assert_eq!(parent, child);
    }

    #[test]
    fn touched_fields_reports_only_written_fields() {
        let update = StateUpdate::new().with_error("problem_framing: failed");
        assert_eq!(update.touched_fields(), vec!["errors"]);
        assert!(StateUpdate::new().is_empty());
    }
}
