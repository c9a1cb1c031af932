use crate::state::{EvidenceItem, PhaseEntry, PhaseStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDto {
    pub namespace: Vec<String>,
    pub key: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub error: Map<String, Value>,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default)]
    pub evidence: Vec<EvidenceDto>,
}

pub fn canonicalize_evidence(evidence: &[EvidenceDto]) -> Vec<EvidenceDto> {
    evidence
        .iter()
        .map(|item| EvidenceDto {
            score: Some(item.score.filter(|score| score.is_finite()).unwrap_or(0.0)),
            ..item.clone()
        })
        .collect()
}

pub fn phase_result_to_entry(result: &PhaseResult) -> PhaseEntry {
    let evidence = canonicalize_evidence(&result.evidence)
        .into_iter()
        .map(|item| EvidenceItem::new(item.namespace, item.key, item.score.unwrap_or(0.0)))
        .collect();
    let mut entry = PhaseEntry::default();
    entry.data = result.data.clone();
    entry.error = result.error.clone();
    entry.status = result.status;
    entry.evidence = evidence;
    entry
}

pub fn phase_entry_to_result(entry: &PhaseEntry) -> PhaseResult {
    PhaseResult {
        data: entry.data.clone(),
        error: entry.error.clone(),
        status: entry.status,
        evidence: entry
            .evidence
            .iter()
            .map(|item| EvidenceDto {
                namespace: item.namespace.clone(),
                key: item.key.clone(),
                score: Some(item.score),
            })
            .collect(),
    }
}
