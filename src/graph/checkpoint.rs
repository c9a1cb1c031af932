use super::GraphError;
use crate::shared::ThreadId;
use crate::state::SageState;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub trait Checkpointer: Send + Sync {
    fn load(&self, thread_id: &ThreadId) -> Result<Option<SageState>, GraphError>;

    fn save(&self, thread_id: &ThreadId, state: &SageState) -> Result<(), GraphError>;
}

#[derive(Debug, Clone)]
struct ThreadCheckpoint {
    state: SageState,
    saves: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    threads: Mutex<BTreeMap<ThreadId, ThreadCheckpoint>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint_count(&self, thread_id: &ThreadId) -> Result<u64, GraphError> {
        let threads = self
            .threads
            .lock()
            .map_err(|_| GraphError::CheckpointPoisoned)?;
        Ok(threads.get(thread_id).map_or(0, |entry| entry.saves))
    }

    pub fn thread_ids(&self) -> Result<Vec<ThreadId>, GraphError> {
        let threads = self
            .threads
            .lock()
            .map_err(|_| GraphError::CheckpointPoisoned)?;
        Ok(threads.keys().cloned().collect())
    }
}

impl Checkpointer for InMemoryCheckpointer {
    fn load(&self, thread_id: &ThreadId) -> Result<Option<SageState>, GraphError> {
        let threads = self
            .threads
            .lock()
            .map_err(|_| GraphError::CheckpointPoisoned)?;
        Ok(threads.get(thread_id).map(|entry| entry.state.clone()))
    }

    fn save(&self, thread_id: &ThreadId, state: &SageState) -> Result<(), GraphError> {
        let mut threads = self
            .threads
            .lock()
            .map_err(|_| GraphError::CheckpointPoisoned)?;
        let entry = threads
            .entry(thread_id.clone())
            .or_insert_with(|| ThreadCheckpoint {
                state: SageState::default(),
                saves: 0,
            });
        entry.state = state.clone();
        entry.saves += 1;
        Ok(())
    }
}
