//! Process-local checkpoint store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Checkpoint, CheckpointStore};
use crate::error::{Result, TurnstileError};

#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.checkpoints.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.read().await.get(thread_id).cloned())
    }

    async fn put(&self, mut checkpoint: Checkpoint) -> Result<Checkpoint> {
        let mut checkpoints = self.checkpoints.write().await;
        let found = checkpoints
            .get(&checkpoint.thread_id)
            .map_or(0, |stored| stored.version);
        if found != checkpoint.version {
            return Err(TurnstileError::VersionConflict {
                thread_id: checkpoint.thread_id,
                expected: checkpoint.version,
                found,
            });
        }
        checkpoint.version += 1;
        checkpoint.updated_at = Utc::now();
        checkpoints.insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(checkpoint)
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        self.checkpoints.write().await.remove(thread_id);
        Ok(())
    }
}
