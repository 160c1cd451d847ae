//! Filesystem-backed broker and result store.
//!
//! Layout under the spool root:
//!
//! ```text
//! tmp/                     staging for atomic writes
//! queue/<name>/ready/      <not_before_ms>-<message_id>.json
//! queue/<name>/claimed/    same names, owned by one worker
//! queue/<name>/dead/       unparseable messages
//! results/                 <message_id>.json
//! ```
//!
//! Every file appears through a rename, so readers never observe partial
//! writes, and a claim is a rename out of `ready/` that exactly one process
//! can win. All processes sharing the root must see it on one filesystem.

use super::{Broker, Lookup, ResultStore, StoredResult, TaskHandle, TaskMessage, TaskOutcome, TaskQueue};
use crate::config::Config;
use crate::error::PipelineError;
use crate::util::{ensure_dir, now_unix_ms, write_atomic};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub struct SpoolBroker {
    root: PathBuf,
    queue: String,
    result_ttl: Duration,
}

impl SpoolBroker {
    pub fn open(root: &Path, queue: &str, result_ttl: Duration) -> Result<Self, PipelineError> {
        let broker = Self {
            root: root.to_path_buf(),
            queue: queue.to_string(),
            result_ttl,
        };
        for dir in [
            broker.tmp_dir(),
            broker.ready_dir(),
            broker.claimed_dir(),
            broker.dead_dir(),
            broker.results_dir(),
        ] {
            ensure_dir(&dir).map_err(|e| {
                PipelineError::DispatchFailure(format!("spool unavailable: {e:#}"))
            })?;
        }
        Ok(broker)
    }

    pub fn from_config(cfg: &Config) -> Result<Self, PipelineError> {
        Self::open(
            Path::new(&cfg.paths.spool_dir),
            &cfg.broker.queue,
            cfg.broker.result_ttl(),
        )
    }

    pub fn ready_len(&self) -> Result<usize> {
        Ok(list_json(&self.ready_dir())?.len())
    }

    pub fn claimed_len(&self) -> Result<usize> {
        Ok(list_json(&self.claimed_dir())?.len())
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    fn queue_dir(&self) -> PathBuf {
        self.root.join("queue").join(&self.queue)
    }

    fn ready_dir(&self) -> PathBuf {
        self.queue_dir().join("ready")
    }

    fn claimed_dir(&self) -> PathBuf {
        self.queue_dir().join("claimed")
    }

    fn dead_dir(&self) -> PathBuf {
        self.queue_dir().join("dead")
    }

    fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    fn result_path(&self, message_id: &str) -> PathBuf {
        self.results_dir().join(format!("{message_id}.json"))
    }

    fn enqueue(&self, msg: &TaskMessage) -> Result<()> {
        let bytes = serde_json::to_vec(msg)?;
        write_atomic(
            &self.tmp_dir(),
            &self.ready_dir().join(file_name(msg)),
            &bytes,
        )
    }

    fn drop_claim(&self, msg: &TaskMessage) -> Result<()> {
        let path = self.claimed_dir().join(file_name(msg));
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            // Already redelivered after a lease expiry; nothing left to drop.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove claim {}", path.display())),
        }
    }
}

impl Broker for SpoolBroker {
    fn submit(&self, msg: &TaskMessage) -> Result<(), PipelineError> {
        self.enqueue(msg).map_err(|e| {
            PipelineError::DispatchFailure(format!("submit {}: {e:#}", msg.message_id))
        })?;
        debug!(
            "submitted message_id={} chunk={}",
            msg.message_id, msg.chunk.index
        );
        Ok(())
    }
}

impl ResultStore for SpoolBroker {
    fn get(&self, handle: &TaskHandle) -> Result<Lookup, PipelineError> {
        let lookup_err = |reason: String| PipelineError::ResultLookupFailure {
            message_id: handle.message_id.clone(),
            reason,
        };

        let raw = match std::fs::read(self.result_path(&handle.message_id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Lookup::NotReady),
            Err(e) => return Err(lookup_err(e.to_string())),
        };
        let stored: StoredResult =
            serde_json::from_slice(&raw).map_err(|e| lookup_err(e.to_string()))?;

        let age = now_unix_ms().saturating_sub(stored.stored_at_ms);
        if age > self.result_ttl.as_millis() as u64 {
            return Ok(Lookup::NotReady);
        }
        Ok(Lookup::Ready(stored.outcome))
    }
}

impl TaskQueue for SpoolBroker {
    fn claim(&self) -> Result<Option<TaskMessage>> {
        let now = now_unix_ms();
        for name in list_json(&self.ready_dir())? {
            if due_ms(&name).is_some_and(|due| due > now) {
                // Names sort by due time.
                break;
            }

            let from = self.ready_dir().join(&name);
            let to = self.claimed_dir().join(&name);
            // The lease runs from mtime, which the rename keeps.
            match touch(&from) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("touch {}", from.display())),
            }
            match std::fs::rename(&from, &to) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("claim {}", from.display())),
            }

            let raw = match std::fs::read(&to) {
                Ok(raw) => raw,
                // Lost to another worker's redelivery.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("read {}", to.display())),
            };
            match serde_json::from_slice::<TaskMessage>(&raw) {
                Ok(msg) => {
                    debug!("claimed message_id={} attempt={}", msg.message_id, msg.attempt);
                    return Ok(Some(msg));
                }
                Err(err) => {
                    warn!("unparseable message {name}: {err}; moving to dead/");
                    std::fs::rename(&to, self.dead_dir().join(&name))
                        .with_context(|| format!("bury {name}"))?;
                }
            }
        }
        Ok(None)
    }

    fn complete(&self, msg: &TaskMessage, outcome: TaskOutcome) -> Result<()> {
        let stored = StoredResult {
            message_id: msg.message_id.clone(),
            chunk_index: msg.chunk.index,
            outcome,
            stored_at_ms: now_unix_ms(),
        };
        write_atomic(
            &self.tmp_dir(),
            &self.result_path(&msg.message_id),
            &serde_json::to_vec(&stored)?,
        )?;
        self.drop_claim(msg)
    }

    fn release(&self, msg: &TaskMessage) -> Result<()> {
        let name = file_name(msg);
        match std::fs::rename(self.claimed_dir().join(&name), self.ready_dir().join(&name)) {
            Ok(()) => {
                debug!("released message_id={}", msg.message_id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("release {name}")),
        }
    }

    fn retry(&self, msg: &TaskMessage, delay: Duration) -> Result<()> {
        let next = TaskMessage {
            attempt: msg.attempt + 1,
            not_before_ms: now_unix_ms() + delay.as_millis() as u64,
            ..msg.clone()
        };
        self.enqueue(&next)?;
        self.drop_claim(msg)
    }

    fn requeue_stale(&self, lease: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut moved = 0;
        for name in list_json(&self.claimed_dir())? {
            let path = self.claimed_dir().join(&name);
            let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
            };
            if now.duration_since(modified).unwrap_or_default() <= lease {
                continue;
            }
            match std::fs::rename(&path, self.ready_dir().join(&name)) {
                Ok(()) => {
                    warn!("lease expired, redelivering {name}");
                    moved += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("requeue {name}")),
            }
        }
        Ok(moved)
    }

    fn purge_expired(&self, ttl: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for name in list_json(&self.results_dir())? {
            let path = self.results_dir().join(&name);
            let Ok(modified) = std::fs::metadata(&path).and_then(|m| m.modified()) else {
                continue;
            };
            if now.duration_since(modified).unwrap_or_default() > ttl
                && std::fs::remove_file(&path).is_ok()
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn file_name(msg: &TaskMessage) -> String {
    format!("{:013}-{}.json", msg.not_before_ms, msg.message_id)
}

fn due_ms(name: &str) -> Option<u64> {
    name.split_once('-').and_then(|(due, _)| due.parse().ok())
}

fn touch(path: &Path) -> std::io::Result<()> {
    File::options()
        .write(true)
        .open(path)
        .and_then(|f| f.set_modified(SystemTime::now()))
}

fn list_json(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".json") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
