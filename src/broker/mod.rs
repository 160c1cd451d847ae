pub mod spool;
pub mod types;

use crate::error::PipelineError;
use anyhow::Result;
use std::time::Duration;

pub use spool::SpoolBroker;
pub use types::{Lookup, StoredResult, TaskHandle, TaskMessage, TaskOutcome};

pub trait Broker {
    fn submit(&self, msg: &TaskMessage) -> Result<(), PipelineError>;

    fn submit_group(&self, msgs: &[TaskMessage]) -> Result<(), PipelineError> {
        for msg in msgs {
            self.submit(msg)?;
        }
        Ok(())
    }
}

pub trait ResultStore {
    fn get(&self, handle: &TaskHandle) -> Result<Lookup, PipelineError>;
}

pub trait TaskQueue {
    fn claim(&self) -> Result<Option<TaskMessage>>;

    fn complete(&self, msg: &TaskMessage, outcome: TaskOutcome) -> Result<()>;

    /// Hand an unprocessed claim back as is, without counting an attempt.
    fn release(&self, msg: &TaskMessage) -> Result<()>;

    fn retry(&self, msg: &TaskMessage, delay: Duration) -> Result<()>;

    /// Return claims older than `lease` to the ready queue. Returns how many moved.
    fn requeue_stale(&self, lease: Duration) -> Result<usize>;

    fn purge_expired(&self, ttl: Duration) -> Result<usize>;
}

pub fn backoff(attempt: u32, min_ms: u64, max_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let ms = min_ms.saturating_mul(factor).min(max_ms.max(min_ms));
    Duration::from_millis(ms)
}
