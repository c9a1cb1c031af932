use crate::shared::{new_event_uid, now_iso8601};
use crate::state::{EventKind, StateUpdate, TraceEvent};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub fn emit_event(
    owner: &str,
    kind: EventKind,
    message: &str,
    phase: Option<&str>,
    data: Option<Map<String, Value>>,
) -> StateUpdate {
    let event = TraceEvent::new(
        new_event_uid(),
        now_iso8601(),
        owner,
        kind,
        message,
        phase.map(str::to_string),
        data,
    );
    StateUpdate {
        events: vec![event],
        ..StateUpdate::default()
    }
}

pub fn add_events(existing: &[TraceEvent], new: &[TraceEvent]) -> Vec<TraceEvent> {
    let mut seen: BTreeSet<&str> = existing.iter().map(TraceEvent::uid).collect();
    let mut merged = existing.to_vec();
    for event in new {
        if seen.insert(event.uid()) {
            merged.push(event.clone());
        }
    }
    merged
}

pub fn merge_event_updates(updates: impl IntoIterator<Item = StateUpdate>) -> StateUpdate {
    updates
        .into_iter()
        .fold(StateUpdate::default(), StateUpdate::merge)
}

pub fn event_data(fields: &[(&str, Value)]) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| ((*key).to_string(), value.clone()))
        .collect()
}
