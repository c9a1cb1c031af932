use super::{EvidenceStore, StoreError, StoreItem, StoredValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

type StoreKey = (Vec<String>, String);

#[derive(Debug, Default)]
pub struct InMemoryStore {
    items: Mutex<BTreeMap<StoreKey, StoredValue>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|term| term.len() > 2)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

fn overlap_score(terms: &[String], value: &StoredValue) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = format!("{} {}", value.title, value.text).to_lowercase();
    let matched = terms
        .iter()
        .filter(|term| haystack.contains(term.as_str()))
        .count();
    matched as f64 / terms.len() as f64
}

fn list_contains(values: &[String], expected: &Value) -> bool {
    match expected {
        Value::String(text) => values.iter().any(|value| value == text),
        Value::Array(items) => items
            .iter()
            .all(|item| item.as_str().is_some_and(|text| values.iter().any(|v| v == text))),
        _ => false,
    }
}

fn matches_filter(value: &StoredValue, filter: Option<&Map<String, Value>>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter.iter().all(|(field, expected)| match field.as_str() {
        "title" => expected.as_str() == Some(value.title.as_str()),
        "tags" => list_contains(&value.tags, expected),
        "agents" => list_contains(&value.agents, expected),
        "changed" => expected.as_i64() == Some(value.changed),
        _ => false,
    })
}

impl EvidenceStore for InMemoryStore {
    fn get(&self, namespace: &[String], key: &str) -> Result<Option<StoreItem>, StoreError> {
        let items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(items
            .get(&(namespace.to_vec(), key.to_string()))
            .map(|value| StoreItem {
                namespace: namespace.to_vec(),
                key: key.to_string(),
                value: value.clone(),
                score: None,
            }))
    }

    fn search(
        &self,
        namespace_prefix: &[String],
        query: &str,
        limit: usize,
        offset: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<StoreItem>, StoreError> {
        let terms = query_terms(query);
        let items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        let mut hits: Vec<StoreItem> = items
            .iter()
            .filter(|((namespace, _), value)| {
                namespace.starts_with(namespace_prefix) && matches_filter(value, filter)
            })
            .filter_map(|((namespace, key), value)| {
                let score = overlap_score(&terms, value);
                if !terms.is_empty() && score <= 0.0 {
                    return None;
                }
                Some(StoreItem {
                    namespace: namespace.clone(),
                    key: key.clone(),
                    value: value.clone(),
                    score: (!terms.is_empty()).then_some(score),
                })
            })
            .collect();
        // Stable sort keeps namespace/key order between equal scores.
        hits.sort_by(|left, right| {
            right
                .score
                .unwrap_or_default()
                .total_cmp(&left.score.unwrap_or_default())
        });
        Ok(hits.into_iter().skip(offset).take(limit).collect())
    }

    fn put(&self, namespace: &[String], key: &str, value: StoredValue) -> Result<(), StoreError> {
        if namespace.is_empty() || namespace.iter().any(|segment| segment.is_empty()) {
            return Err(StoreError::InvalidNamespace(namespace.join("/")));
        }
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        items.insert((namespace.to_vec(), key.to_string()), value);
        Ok(())
    }
}
