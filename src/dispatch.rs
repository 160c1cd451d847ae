use crate::broker::{Broker, TaskHandle, TaskMessage};
use crate::chunk_plan::ChunkSpec;
use crate::error::PipelineError;
use crate::util::{now_unix_ms, sha256_hex};
use std::collections::BTreeMap;
use tracing::info;

pub struct Dispatcher<'a, B: Broker + ?Sized> {
    broker: &'a B,
    group_id: String,
}

impl<'a, B: Broker + ?Sized> Dispatcher<'a, B> {
    pub fn new(broker: &'a B, group_id: impl Into<String>) -> Self {
        Self {
            broker,
            group_id: group_id.into(),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn messages(&self, source_path: &str, specs: &[ChunkSpec]) -> Vec<TaskMessage> {
        let now = now_unix_ms();
        specs
            .iter()
            .map(|spec| TaskMessage {
                message_id: sha256_hex(format!("{}:{}", self.group_id, spec.index).as_bytes()),
                group_id: self.group_id.clone(),
                source_path: source_path.to_string(),
                chunk: *spec,
                attempt: 0,
                enqueued_at_ms: now,
                not_before_ms: now,
            })
            .collect()
    }

    pub fn dispatch(
        &self,
        source_path: &str,
        specs: &[ChunkSpec],
    ) -> Result<BTreeMap<u32, TaskHandle>, PipelineError> {
        let msgs = self.messages(source_path, specs);
        self.broker.submit_group(&msgs)?;

        info!(
            "dispatched group={} chunks={} source={}",
            self.group_id,
            msgs.len(),
            source_path
        );
        Ok(msgs.iter().map(|m| (m.chunk.index, m.handle())).collect())
    }
}
