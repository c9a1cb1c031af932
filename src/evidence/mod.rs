pub mod dto;
pub mod memory_store;

pub use dto::{
    canonicalize_evidence, phase_entry_to_result, phase_result_to_entry, EvidenceDto, PhaseResult,
};
pub use memory_store::InMemoryStore;

use crate::shared::EngineLog;
use crate::state::{EvidenceItem, PhaseEntry, SageState};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const CONTEXT_NAMESPACE_PREFIX: [&str; 3] = ["drupal", "context", "agent"];
pub const DEFAULT_MAX_CONTEXT_ITEMS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("evidence store unavailable: {0}")]
    Unavailable(String),
    #[error("evidence store lock poisoned")]
    Poisoned,
    #[error("invalid namespace `{0}`")]
    InvalidNamespace(String),
}

pub fn phase_namespace(phase: &str) -> Vec<String> {
    CONTEXT_NAMESPACE_PREFIX
        .iter()
        .map(|segment| (*segment).to_string())
        .chain(std::iter::once(phase.to_string()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredValue {
    pub text: String,
    pub title: String,
    pub tags: Vec<String>,
    pub agents: Vec<String>,
    pub changed: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreItem {
    pub namespace: Vec<String>,
    pub key: String,
    pub value: StoredValue,
    pub score: Option<f64>,
}

pub trait EvidenceStore: Send + Sync {
    fn get(&self, namespace: &[String], key: &str) -> Result<Option<StoreItem>, StoreError>;

    fn search(
        &self,
        namespace_prefix: &[String],
        query: &str,
        limit: usize,
        offset: usize,
        filter: Option<&Map<String, Value>>,
    ) -> Result<Vec<StoreItem>, StoreError>;

    fn put(&self, namespace: &[String], key: &str, value: StoredValue) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn from_store_item(item: &StoreItem, score: Option<f64>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("title".to_string(), json!(item.value.title));
        metadata.insert("tags".to_string(), json!(item.value.tags));
        metadata.insert("agents".to_string(), json!(item.value.agents));
        metadata.insert("changed".to_string(), json!(item.value.changed));
        metadata.insert("store_namespace".to_string(), json!(item.namespace));
        metadata.insert("store_key".to_string(), json!(item.key));
        metadata.insert(
            "score".to_string(),
            score.or(item.score).map_or(Value::Null, |value| json!(value)),
        );
        Self {
            page_content: item.value.text.clone(),
            metadata,
        }
    }

    pub fn store_namespace(&self) -> Option<Vec<String>> {
        let segments = self.metadata.get("store_namespace")?.as_array()?;
        segments
            .iter()
            .map(|segment| segment.as_str().map(str::to_string))
            .collect()
    }

    pub fn store_key(&self) -> Option<&str> {
        self.metadata.get("store_key").and_then(Value::as_str)
    }

    pub fn score(&self) -> Option<f64> {
        self.metadata.get("score").and_then(Value::as_f64)
    }

    pub fn to_evidence_item(&self) -> Option<EvidenceItem> {
        let namespace = self.store_namespace().filter(|ns| !ns.is_empty())?;
        let key = self.store_key().filter(|key| !key.is_empty())?;
        Some(EvidenceItem::new(
            namespace,
            key,
            self.score().unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceBundle {
    pub phase_entry: PhaseEntry,
    pub evidence: Vec<EvidenceItem>,
    pub context_docs: Vec<Document>,
    pub missing_store: bool,
}

/// Fetches up to `max_items` pointers in retrieval order. Unresolvable pointers
/// and store errors are skipped.
pub fn hydrate_evidence_docs(
    evidence: &[EvidenceItem],
    phase: &str,
    max_items: usize,
    store: &dyn EvidenceStore,
    log: &EngineLog,
) -> Vec<Document> {
    let mut docs = Vec::new();
    for item in evidence.iter().take(max_items) {
        if item.namespace.is_empty() || item.key.is_empty() {
            continue;
        }
        match store.get(&item.namespace, &item.key) {
            Ok(Some(stored)) => docs.push(Document::from_store_item(&stored, Some(item.score))),
            Ok(None) => log.info(
                "evidence.missing_item",
                &[("phase", json!(phase)), ("key", json!(item.key))],
            ),
            Err(err) => log.warn(
                "evidence.store_error",
                &[("phase", json!(phase)), ("error", json!(err.to_string()))],
            ),
        }
    }
    docs
}

pub fn collect_phase_evidence(
    state: &SageState,
    phase: &str,
    max_items: usize,
    store: Option<&dyn EvidenceStore>,
    log: &EngineLog,
) -> EvidenceBundle {
    let phase_entry = state.phase(phase).cloned().unwrap_or_default();
    let evidence = phase_entry.evidence.clone();
    let (context_docs, missing_store) = match store {
        Some(store) => (
            hydrate_evidence_docs(&evidence, phase, max_items, store, log),
            false,
        ),
        None => {
            log.warn(
                "evidence.missing_runtime_store",
                &[("phase", json!(phase)), ("evidence", json!(evidence.len()))],
            );
            (Vec::new(), true)
        }
    };
    EvidenceBundle {
        phase_entry,
        evidence,
        context_docs,
        missing_store,
    }
}

pub fn evidence_to_items(bundle: &EvidenceBundle) -> Vec<EvidenceItem> {
    bundle
        .evidence
        .iter()
        .filter(|item| !item.namespace.is_empty() && !item.key.is_empty())
        .map(|item| EvidenceItem {
            score: if item.score.is_finite() { item.score } else { 0.0 },
            ..item.clone()
        })
        .collect()
}
