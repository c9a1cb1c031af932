use super::Command;
use crate::evidence::EvidenceStore;
use crate::shared::EngineLog;
use crate::state::SageState;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RuntimeContext {
    pub store: Option<Arc<dyn EvidenceStore>>,
    pub log: EngineLog,
}

impl RuntimeContext {
    pub fn new(store: Option<Arc<dyn EvidenceStore>>, log: EngineLog) -> Self {
        Self { store, log }
    }

    pub fn store(&self) -> Option<&dyn EvidenceStore> {
        self.store.as_deref()
    }
}

/// One step of the graph. Nodes read the pre-step snapshot and never fail:
/// errors are written into the returned update.
pub trait Node: Send + Sync {
    fn owner(&self) -> &str;

    fn run(&self, state: &SageState, runtime: &RuntimeContext) -> Command;
}
