use super::{types::*, ConversionEngine, EngineFault};
use crate::config::Config;
use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Docling running in a long-lived Python child, one request at a time over
/// line-delimited JSON on stdin/stdout.
pub struct DoclingEngine {
    diag: EngineDiag,
    time_limit: Option<Duration>,
    session: Mutex<Session>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
    next_id: u64,
    broken: Option<String>,
}

impl DoclingEngine {
    pub fn spawn(cfg: &Config) -> Result<Self> {
        let scripts_dir = PathBuf::from(&cfg.paths.scripts_dir);
        if cfg.security.pin_scripts_dir {
            let cwd = std::env::current_dir().with_context(|| "current_dir")?;
            let canon = scripts_dir
                .canonicalize()
                .with_context(|| format!("canonicalize scripts_dir: {}", scripts_dir.display()))?;
            if !canon.starts_with(&cwd) {
                return Err(anyhow!(
                    "scripts_dir is outside cwd while pin_scripts_dir=true: {}",
                    canon.display()
                ));
            }
        }
        let script = scripts_dir.join(&cfg.docling.worker_script);
        if !script.exists() {
            return Err(anyhow!("missing script: {}", script.display()));
        }
        let python_exe = resolve_python_exe(&cfg.docling.python_exe)?;

        let started = Instant::now();
        let mut cmd = Command::new(&python_exe);
        cmd.arg(&script);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        apply_env(&mut cmd, cfg);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning python: {}", script.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("no stderr"))?;

        let (tx, lines) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        // Drain stderr continuously so verbose model logging can't fill the pipe.
        let keep_stderr = cfg.debug.keep_python_stderr;
        let child_pid = child.id();
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                if keep_stderr {
                    debug!("python stderr pid={child_pid}: {}", line.trim_end());
                }
            }
        });

        let mut session = Session {
            child,
            stdin,
            lines,
            next_id: 1,
            broken: None,
        };

        let startup = Duration::from_secs(cfg.docling.startup_timeout_seconds.max(1));
        let raw = match session.recv_line(startup) {
            Ok(raw) => raw,
            Err(err) => {
                session.kill();
                return Err(err).with_context(|| "waiting for docling worker ready line");
            }
        };
        let ready: ReadyLine = serde_json::from_str(&raw)
            .with_context(|| format!("parsing ready line: {}", raw.trim()))?;
        if !ready.ready {
            session.kill();
            return Err(anyhow!(
                "docling worker failed to start: {}",
                ready.error.unwrap_or_else(|| "unknown error".into())
            ));
        }

        let diag = EngineDiag {
            python_exe: python_exe.display().to_string(),
            python_version: ready.python_version,
            docling_version: ready.docling_version,
            child_pid: ready.pid,
            load_seconds: started.elapsed().as_secs_f64(),
        };

        Ok(Self {
            diag,
            time_limit: cfg.broker.time_limit(),
            session: Mutex::new(session),
        })
    }

    pub fn diag(&self) -> &EngineDiag {
        &self.diag
    }
}

impl ConversionEngine for DoclingEngine {
    fn convert(&self, name: &str, pdf: &[u8]) -> Result<String> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("engine session lock poisoned"))?;
        if let Some(reason) = &session.broken {
            return Err(EngineFault::Exited(reason.clone()).into());
        }

        let id = session.next_id;
        session.next_id += 1;
        let req = ConvertRequest {
            id,
            name: name.to_string(),
            pdf_b64: base64::engine::general_purpose::STANDARD.encode(pdf),
        };
        let mut line = serde_json::to_vec(&req)?;
        line.push(b'\n');
        if let Err(err) = session
            .stdin
            .write_all(&line)
            .and_then(|_| session.stdin.flush())
        {
            session.broken = Some(format!("write failed: {err}"));
            return Err(EngineFault::Exited(format!("write failed: {err}")).into());
        }

        let deadline = self.time_limit.map(|t| Instant::now() + t);
        loop {
            let wait = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => Duration::from_secs(3600),
            };
            let raw = match session.recv_line(wait) {
                Ok(raw) => raw,
                Err(err) => match err.downcast::<RecvTimeoutError>() {
                    Ok(RecvTimeoutError::Timeout) if deadline.is_some() => {
                        let limit = self.time_limit.unwrap_or_default();
                        warn!("docling worker timed out after {:?}; killing", limit);
                        session.kill();
                        session.broken = Some("killed after time limit".into());
                        return Err(EngineFault::TimeLimit(limit).into());
                    }
                    Ok(RecvTimeoutError::Timeout) => continue,
                    Ok(RecvTimeoutError::Disconnected) => {
                        let status = session.child.try_wait().ok().flatten();
                        let reason = format!("stdout closed (status={status:?})");
                        session.broken = Some(reason.clone());
                        return Err(EngineFault::Exited(reason).into());
                    }
                    Err(other) => return Err(other),
                },
            };

            let resp: ConvertResponse = match serde_json::from_str(&raw) {
                Ok(resp) => resp,
                Err(_) => {
                    debug!("python stdout (non-protocol): {}", raw.trim_end());
                    continue;
                }
            };
            if resp.id != id {
                warn!("discarding stale engine response id={} want={}", resp.id, id);
                continue;
            }
            if !resp.ok {
                return Err(anyhow!(
                    "docling convert failed for {name}: {}",
                    resp.error.unwrap_or_else(|| "unknown error".into())
                ));
            }
            return Ok(resp.markdown);
        }
    }

    fn is_healthy(&self) -> bool {
        self.session
            .lock()
            .map(|s| s.broken.is_none())
            .unwrap_or(false)
    }
}

impl Session {
    fn recv_line(&mut self, timeout: Duration) -> Result<String> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => line.with_context(|| "read python stdout"),
            Err(err) => Err(anyhow::Error::new(err)),
        }
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill();
    }
}

fn apply_env(cmd: &mut Command, cfg: &Config) {
    if cfg.docling.offline {
        cmd.env("HF_HUB_OFFLINE", "1");
    }
    if cfg.docling.single_threaded {
        for var in [
            "OMP_NUM_THREADS",
            "MKL_NUM_THREADS",
            "OPENBLAS_NUM_THREADS",
            "TORCH_NUM_THREADS",
        ] {
            cmd.env(var, "1");
        }
    }
    cmd.env("QUIRE_DO_OCR", bool_env(cfg.docling.do_ocr));
    cmd.env(
        "QUIRE_DO_TABLE_STRUCTURE",
        bool_env(cfg.docling.do_table_structure),
    );
    if !cfg.docling.models_dir.is_empty() {
        cmd.env("QUIRE_MODELS_DIR", &cfg.docling.models_dir);
    }
    if let Some(artifacts_dir) = resolve_artifacts_dir(cfg) {
        cmd.env("DOCLING_ARTIFACTS_PATH", artifacts_dir);
    }
    for (k, v) in &cfg.docling.env {
        cmd.env(k, v);
    }
}

fn bool_env(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

fn resolve_python_exe(raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("DOCLING_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return Ok(p);
            }
        }
        let venv = Path::new(".venv/bin/python");
        if venv.exists() {
            return Ok(venv.to_path_buf());
        }
        return Ok(PathBuf::from("python3"));
    }
    Ok(expand_tilde(raw))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn resolve_artifacts_dir(cfg: &Config) -> Option<PathBuf> {
    if !cfg.paths.docling_artifacts_dir.is_empty() {
        return Some(PathBuf::from(&cfg.paths.docling_artifacts_dir));
    }
    None
}
