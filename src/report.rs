use crate::{chunk_plan::ChunkSpec, document::ProbeResult, merge::RunStats, poller::ChunkResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub input: ProbeResult,
    pub group_id: String,
    pub chunk_size: u32,
    pub started: String,
    pub finished: String,
    pub stats: RunStats,
    pub chunk_reports: Vec<ChunkReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkReport {
    pub chunk_index: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub ok: bool,
    pub chars: usize,
    #[serde(default)]
    pub error: Option<String>,
}

impl ChunkReport {
    pub fn collect(chunks: &[ChunkSpec], results: &BTreeMap<u32, ChunkResult>) -> Vec<Self> {
        chunks
            .iter()
            .map(|c| {
                let (ok, chars, error) = match results.get(&c.index) {
                    Some(ChunkResult::Success(text)) => (true, text.len(), None),
                    Some(ChunkResult::Failure(reason)) => (false, 0, Some(reason.clone())),
                    Some(ChunkResult::Pending) | None => (false, 0, Some("unresolved".into())),
                };
                ChunkReport {
                    chunk_index: c.index,
                    start_page: c.start_page,
                    end_page: c.end_page,
                    ok,
                    chars,
                    error,
                }
            })
            .collect()
    }
}
