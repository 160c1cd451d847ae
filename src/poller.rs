use crate::broker::{Lookup, ResultStore, TaskHandle, TaskOutcome};
use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkResult {
    Pending,
    Success(String),
    Failure(String),
}

impl ChunkResult {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ChunkResult::Pending)
    }

    /// Move out of `Pending`. Returns false, leaving `self` untouched, if
    /// already resolved or if `next` is itself `Pending`.
    pub fn resolve(&mut self, next: ChunkResult) -> bool {
        if self.is_resolved() || !next.is_resolved() {
            return false;
        }
        *self = next;
        true
    }
}

impl From<TaskOutcome> for ChunkResult {
    fn from(outcome: TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::Completed { text } => ChunkResult::Success(text),
            TaskOutcome::Failed { reason } => ChunkResult::Failure(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub elapsed: Duration,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub deadline: Option<Duration>,
}

impl PollOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: Duration::from_millis(cfg.poller.interval_ms),
            deadline: (cfg.poller.deadline_seconds > 0)
                .then(|| Duration::from_secs(cfg.poller.deadline_seconds)),
        }
    }
}

pub struct Poller<'a, S: ResultStore + ?Sized> {
    store: &'a S,
    opts: PollOptions,
}

impl<'a, S: ResultStore + ?Sized> Poller<'a, S> {
    pub fn new(store: &'a S, opts: PollOptions) -> Self {
        Self { store, opts }
    }

    /// `on_progress` fires after each pass that resolved at least one chunk.
    pub fn await_all(
        &self,
        handles: &BTreeMap<u32, TaskHandle>,
        mut on_progress: impl FnMut(&Progress),
    ) -> BTreeMap<u32, ChunkResult> {
        let started = Instant::now();
        let total = handles.len();
        let mut results: BTreeMap<u32, ChunkResult> =
            handles.keys().map(|&i| (i, ChunkResult::Pending)).collect();
        let mut completed = 0usize;

        while completed < total {
            for (index, handle) in handles {
                let Some(slot) = results.get_mut(index) else {
                    continue;
                };
                if slot.is_resolved() {
                    continue;
                }
                match self.store.get(handle) {
                    Ok(Lookup::Ready(outcome)) => {
                        slot.resolve(outcome.into());
                    }
                    Ok(Lookup::NotReady) => {}
                    Err(err) => {
                        error!("task error chunk={index} {err}");
                        slot.resolve(ChunkResult::Failure(err.to_string()));
                    }
                }
            }

            let resolved = results.values().filter(|r| r.is_resolved()).count();
            if resolved > completed {
                completed = resolved;
                on_progress(&Progress {
                    elapsed: started.elapsed(),
                    completed,
                    total,
                });
            }
            if completed == total {
                break;
            }

            if let Some(deadline) = self.opts.deadline {
                if started.elapsed() >= deadline {
                    let reason = format!("no result within {}s", deadline.as_secs());
                    for (index, slot) in results.iter_mut() {
                        if slot.resolve(ChunkResult::Failure(reason.clone())) {
                            error!("chunk {index} timed out waiting for result");
                        }
                    }
                    on_progress(&Progress {
                        elapsed: started.elapsed(),
                        completed: total,
                        total,
                    });
                    break;
                }
            }

            std::thread::sleep(self.opts.interval);
        }

        info!(
            "polling done chunks={} elapsed={:.1}s",
            total,
            started.elapsed().as_secs_f64()
        );
        results
    }
}
