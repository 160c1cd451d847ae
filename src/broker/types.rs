use crate::chunk_plan::ChunkSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub message_id: String,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub message_id: String,
    pub group_id: String,
    pub source_path: String,
    pub chunk: ChunkSpec,
    pub attempt: u32,
    pub enqueued_at_ms: u64,
    pub not_before_ms: u64,
}

impl TaskMessage {
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            message_id: self.message_id.clone(),
            chunk_index: self.chunk.index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed { text: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub message_id: String,
    pub chunk_index: u32,
    pub outcome: TaskOutcome,
    pub stored_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Ready(TaskOutcome),
    NotReady,
}
