use crate::{
    broker::{Broker, ResultStore},
    chunk_plan::ChunkPlan,
    config::Config,
    dispatch::Dispatcher,
    document,
    merge::{self, Artifact},
    poller::{ChunkResult, PollOptions, Poller, Progress},
    postprocess::Cleaner,
    report::{ChunkReport, RunReport},
    util::{hash_file, now_rfc3339, now_unix_ms, sha256_hex},
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct PipelineRun {
    pub total_pages: u32,
    pub chunk_size: u32,
    pub results: BTreeMap<u32, ChunkResult>,
    pub started_at: Instant,
    pub completed_count: usize,
}

impl PipelineRun {
    pub fn new(plan: &ChunkPlan) -> Self {
        Self {
            total_pages: plan.page_count,
            chunk_size: plan.chunk_size,
            results: plan
                .chunks
                .iter()
                .map(|c| (c.index, ChunkResult::Pending))
                .collect(),
            started_at: Instant::now(),
            completed_count: 0,
        }
    }

    pub fn record(&mut self, polled: BTreeMap<u32, ChunkResult>) {
        for (index, result) in polled {
            self.results
                .entry(index)
                .or_insert(ChunkResult::Pending)
                .resolve(result);
        }
        self.completed_count = self.results.values().filter(|r| r.is_resolved()).count();
    }
}

pub struct RunOutput {
    pub artifact: Artifact,
    pub report: RunReport,
}

pub struct Pipeline<'a, B: ?Sized> {
    cfg: Config,
    broker: &'a B,
}

impl<'a, B: Broker + ResultStore + ?Sized> Pipeline<'a, B> {
    pub fn new(cfg: &Config, broker: &'a B) -> Self {
        Self {
            cfg: cfg.clone(),
            broker,
        }
    }

    /// Planning and dispatch errors abort the run. Chunk failures only show up
    /// in the artifact and the report.
    pub fn run_document(
        &self,
        input: &Path,
        group_id: &str,
        on_progress: impl FnMut(&Progress),
    ) -> Result<RunOutput> {
        let started = now_rfc3339();
        let cleaner = Cleaner::new(&self.cfg.postprocess)?;

        let source = input
            .canonicalize()
            .with_context(|| format!("canonicalize input: {}", input.display()))?;
        let source_str = source.display().to_string();

        info!("pdf start file={source_str}");
        let probe = document::probe_pdf(&self.cfg, &source)?;
        let plan = ChunkPlan::new(probe.page_count, self.cfg.chunking.pages_per_chunk)?;
        info!(
            "pdf scanned total_pages={} chunks={} chunk_size={}",
            plan.page_count,
            plan.chunks.len(),
            plan.chunk_size
        );
        debug!(?plan, "chunk plan");

        let mut run = PipelineRun::new(&plan);

        let handles = Dispatcher::new(self.broker, group_id).dispatch(&source_str, &plan.chunks)?;
        info!("pipeline sent; waiting for results");

        let polled = Poller::new(self.broker, PollOptions::from_config(&self.cfg))
            .await_all(&handles, on_progress);
        run.record(polled);

        info!("merging results chunks={}", run.results.len());
        let elapsed = run.started_at.elapsed();
        let artifact = merge::assemble(&run.results, run.total_pages, elapsed, &cleaner);

        info!(
            "pdf end file={source_str} time={:.2}s speed={:.1}ppm ok={} failed={}",
            artifact.stats.elapsed_secs,
            artifact.stats.pages_per_minute,
            artifact.stats.succeeded,
            artifact.stats.failed
        );

        let report = RunReport {
            input: probe,
            group_id: group_id.to_string(),
            chunk_size: run.chunk_size,
            started,
            finished: now_rfc3339(),
            stats: artifact.stats.clone(),
            chunk_reports: ChunkReport::collect(&plan.chunks, &run.results),
        };

        Ok(RunOutput { artifact, report })
    }
}

/// Includes the submission time and pid so a rerun of the same document never
/// reads the previous run's results.
pub fn group_id(cfg: &Config, input: &Path) -> Result<String> {
    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let input_hash =
        hash_file(cfg, input).with_context(|| format!("hashing input: {}", input.display()))?;
    Ok(sha256_hex(
        format!(
            "{}:{}:{}:{}",
            cfg_hash,
            input_hash,
            now_unix_ms(),
            std::process::id()
        )
        .as_bytes(),
    ))
}
