use crate::poller::ChunkResult;
use crate::postprocess::Cleaner;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const FAILED_MARKER: &str = "\n<!-- FAILED CHUNK -->\n";

pub fn chunk_delimiter(index: u32) -> String {
    format!("\n<!-- ===== Chunk {index} ===== -->\n")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: u32,
    pub chunk_count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub pages_per_second: f64,
    pub pages_per_minute: f64,
}

impl RunStats {
    pub fn compute(
        total_pages: u32,
        elapsed: Duration,
        results: &BTreeMap<u32, ChunkResult>,
    ) -> Self {
        let succeeded = results
            .values()
            .filter(|r| matches!(r, ChunkResult::Success(_)))
            .count();
        let elapsed_secs = elapsed.as_secs_f64();
        let pages_per_second = if elapsed_secs > 0.0 {
            total_pages as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            total_pages,
            chunk_count: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            elapsed_secs,
            pages_per_second,
            pages_per_minute: pages_per_second * 60.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub text: String,
    pub stats: RunStats,
}

/// Every chunk gets a delimiter. Anything that is not a `Success` is
/// rendered as [`FAILED_MARKER`], so no position is ever dropped.
pub fn merge(results: &BTreeMap<u32, ChunkResult>, cleaner: &Cleaner) -> String {
    let mut out = String::new();
    for (index, result) in results {
        out.push_str(&chunk_delimiter(*index));
        match result {
            ChunkResult::Success(text) => out.push_str(&cleaner.clean(text)),
            ChunkResult::Failure(_) | ChunkResult::Pending => out.push_str(FAILED_MARKER),
        }
    }
    out
}

pub fn assemble(
    results: &BTreeMap<u32, ChunkResult>,
    total_pages: u32,
    elapsed: Duration,
    cleaner: &Cleaner,
) -> Artifact {
    Artifact {
        text: merge(results, cleaner),
        stats: RunStats::compute(total_pages, elapsed, results),
    }
}
