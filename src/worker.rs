use crate::broker::{backoff, TaskMessage, TaskOutcome, TaskQueue};
use crate::config::Config;
use crate::engine::ConversionEngine;
use crate::runtime::RuntimeGuard;
use crate::task;
use anyhow::{bail, Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub eager_init: bool,
    pub idle_poll: Duration,
    pub maintenance_interval: Duration,
    pub lease: Duration,
    pub result_ttl: Duration,
    pub max_retries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl WorkerOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            eager_init: cfg.worker.eager_init,
            idle_poll: Duration::from_millis(cfg.worker.idle_poll_ms),
            maintenance_interval: Duration::from_secs(cfg.worker.maintenance_interval_seconds),
            lease: cfg.broker.lease(),
            result_ttl: cfg.broker.result_ttl(),
            max_retries: cfg.broker.max_retries,
            min_backoff_ms: cfg.broker.min_backoff_ms,
            max_backoff_ms: cfg.broker.max_backoff_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Idle,
    Completed { chunk_index: u32 },
    Failed { chunk_index: u32 },
    Retried { chunk_index: u32, delay: Duration },
}

pub struct Worker<'a, Q: TaskQueue + ?Sized, E> {
    queue: &'a Q,
    guard: &'a RuntimeGuard<E>,
    opts: WorkerOptions,
}

impl<'a, Q: TaskQueue + ?Sized, E: ConversionEngine> Worker<'a, Q, E> {
    pub fn new(queue: &'a Q, guard: &'a RuntimeGuard<E>, opts: WorkerOptions) -> Self {
        Self { queue, guard, opts }
    }

    pub fn boot(&self) -> Result<()> {
        if self.opts.eager_init {
            self.guard
                .get_engine()
                .with_context(|| "engine construction at boot")?;
        }
        Ok(())
    }

    /// Claim and settle at most one message. Any error is fatal to the worker;
    /// a message claimed before the engine failed to build goes back to the queue.
    pub fn run_once(&self) -> Result<Step> {
        let Some(msg) = self.queue.claim()? else {
            return Ok(Step::Idle);
        };
        let engine = match self.guard.get_engine() {
            Ok(engine) => engine,
            Err(err) => {
                self.queue.release(&msg)?;
                return Err(err).with_context(|| "engine construction");
            }
        };

        let chunk_index = msg.chunk.index;
        let step = match task::process(self.guard, &msg.source_path, &msg.chunk) {
            Ok(text) => {
                self.queue
                    .complete(&msg, TaskOutcome::Completed { text })?;
                Step::Completed { chunk_index }
            }
            Err(err) => self.settle_failure(&msg, err.to_string())?,
        };

        if !engine.is_healthy() {
            bail!("engine unusable after chunk {chunk_index}; exiting worker");
        }
        Ok(step)
    }

    fn settle_failure(&self, msg: &TaskMessage, reason: String) -> Result<Step> {
        let chunk_index = msg.chunk.index;
        if msg.attempt < self.opts.max_retries {
            let delay = backoff(msg.attempt, self.opts.min_backoff_ms, self.opts.max_backoff_ms);
            warn!(
                "retrying chunk={chunk_index} attempt={} delay={}ms",
                msg.attempt + 1,
                delay.as_millis()
            );
            self.queue.retry(msg, delay)?;
            return Ok(Step::Retried { chunk_index, delay });
        }
        self.queue.complete(msg, TaskOutcome::Failed { reason })?;
        Ok(Step::Failed { chunk_index })
    }

    pub fn maintain(&self) -> Result<()> {
        let requeued = self.queue.requeue_stale(self.opts.lease)?;
        let purged = self.queue.purge_expired(self.opts.result_ttl)?;
        if requeued > 0 || purged > 0 {
            info!("maintenance requeued={requeued} purged={purged}");
        }
        Ok(())
    }

    pub fn run(&self, burst: bool) -> Result<usize> {
        self.boot()?;
        info!("worker ready pid={} burst={burst}", std::process::id());

        let mut settled = 0usize;
        let mut last_maintenance: Option<Instant> = None;
        loop {
            if last_maintenance.is_none_or(|t| t.elapsed() >= self.opts.maintenance_interval) {
                self.maintain()?;
                last_maintenance = Some(Instant::now());
            }

            match self.run_once()? {
                Step::Idle if burst => break,
                Step::Idle => std::thread::sleep(self.opts.idle_poll),
                _ => settled += 1,
            }
        }

        info!("worker done settled={settled}");
        Ok(settled)
    }
}
