use crate::evidence::{phase_namespace, Document, EvidenceStore, StoreError};
use crate::provider::ToolSpec;
use serde_json::{json, Value};
use std::sync::Arc;

pub const CONTEXT_LOOKUP_TOOL_NAME: &str = "context_lookup";

pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    fn invoke(&self, args: &Value) -> Result<String, String>;
}

pub fn context_lookup(
    store: &dyn EvidenceStore,
    query: &str,
    collection: &str,
    limit: usize,
) -> Result<Vec<Document>, StoreError> {
    let namespace = phase_namespace(collection);
    let items = store.search(&namespace, query, limit, 0, None)?;
    Ok(items
        .iter()
        .map(|item| Document::from_store_item(item, item.score))
        .collect())
}

pub struct ContextLookupTool {
    store: Option<Arc<dyn EvidenceStore>>,
    default_collection: String,
    default_limit: usize,
}

impl ContextLookupTool {
    pub fn new(
        store: Option<Arc<dyn EvidenceStore>>,
        default_collection: impl Into<String>,
        default_limit: usize,
    ) -> Self {
        Self {
            store,
            default_collection: default_collection.into(),
            default_limit,
        }
    }

    pub fn lookup(
        &self,
        query: &str,
        collection: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let store = self
            .store
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("no runtime store configured".to_string()))?;
        context_lookup(
            store,
            query,
            collection.unwrap_or(&self.default_collection),
            limit.unwrap_or(self.default_limit),
        )
    }
}

impl Tool for ContextLookupTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: CONTEXT_LOOKUP_TOOL_NAME.to_string(),
            description: "Search stored context documents for the current step.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "collection": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1}
                },
                "required": ["query"]
            }),
        }
    }

    fn invoke(&self, args: &Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| "context_lookup requires a non-empty `query`".to_string())?;
        let collection = args.get("collection").and_then(Value::as_str);
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|limit| limit as usize);
        let docs = self
            .lookup(query, collection, limit)
            .map_err(|err| err.to_string())?;
        serde_json::to_string(&docs).map_err(|err| err.to_string())
    }
}
