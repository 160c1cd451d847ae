use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub hashing: Hashing,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub chunking: Chunking,
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub poller: Poller,
    #[serde(default)]
    pub worker: Worker,
    #[serde(default)]
    pub docling: Docling,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub job_name: String,
    pub print_summary: bool,
    pub print_progress: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "default".into(),
            print_summary: true,
            print_progress: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
    pub spool_dir: String,
    pub docling_artifacts_dir: String,
    pub scripts_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "output_md".into(),
            spool_dir: ".quire-spool".into(),
            docling_artifacts_dir: "".into(),
            scripts_dir: "scripts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hashing {
    pub mode: String,
    pub fast_window_bytes: u64,
}
impl Default for Hashing {
    fn default() -> Self {
        Self {
            mode: "fast_2x16mb".into(),
            fast_window_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_input_file_bytes: u64,
    pub max_input_pages: u32,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_file_bytes: 2 * 1024 * 1024 * 1024,
            max_input_pages: 20000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunking {
    pub pages_per_chunk: u32,
}
impl Default for Chunking {
    fn default() -> Self {
        Self {
            pages_per_chunk: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broker {
    pub queue: String,
    pub max_retries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub time_limit_seconds: u64,
    pub lease_grace_seconds: u64,
    pub result_ttl_seconds: u64,
}
impl Default for Broker {
    fn default() -> Self {
        Self {
            queue: "default".into(),
            max_retries: 0,
            min_backoff_ms: 1_000,
            max_backoff_ms: 900_000,
            time_limit_seconds: 7200,
            lease_grace_seconds: 60,
            result_ttl_seconds: 7200,
        }
    }
}
impl Broker {
    pub fn time_limit(&self) -> Option<Duration> {
        (self.time_limit_seconds > 0).then(|| Duration::from_secs(self.time_limit_seconds))
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.time_limit_seconds + self.lease_grace_seconds)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poller {
    pub interval_ms: u64,
    pub deadline_seconds: u64,
}
impl Default for Poller {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            deadline_seconds: 10_800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub eager_init: bool,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub idle_poll_ms: u64,
    pub maintenance_interval_seconds: u64,
}
impl Default for Worker {
    fn default() -> Self {
        Self {
            eager_init: true,
            jitter_min_ms: 100,
            jitter_max_ms: 5_000,
            idle_poll_ms: 250,
            maintenance_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Docling {
    pub python_exe: String,
    pub worker_script: String,
    pub startup_timeout_seconds: u64,
    pub do_ocr: bool,
    pub do_table_structure: bool,
    pub models_dir: String,
    pub offline: bool,
    pub single_threaded: bool,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Docling {
    fn default() -> Self {
        Self {
            python_exe: "auto".into(),
            worker_script: "docling_worker.py".into(),
            startup_timeout_seconds: 600,
            do_ocr: true,
            do_table_structure: false,
            models_dir: "/opt/shared/deps/rapidocr_models".into(),
            offline: true,
            single_threaded: true,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postprocess {
    pub normalize_unicode: bool,
    pub normalize_newlines: bool,
    pub trim_trailing_whitespace: bool,
    pub remove_by_regex: bool,
    #[serde(default)]
    pub regex: PostprocessRegex,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            normalize_unicode: false,
            normalize_newlines: true,
            trim_trailing_whitespace: true,
            remove_by_regex: false,
            regex: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostprocessRegex {
    pub patterns: Vec<String>,
}
impl Default for PostprocessRegex {
    fn default() -> Self {
        Self {
            patterns: vec!["^(page\\s+\\d+|\\d+\\s*/\\s*\\d+)$".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub extension: String,
    pub write_report_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            extension: "md".into(),
            write_report_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_python_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_python_stderr: true,
            dump_effective_config: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub reject_url_inputs: bool,
    pub pin_scripts_dir: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
            pin_scripts_dir: true,
        }
    }
}
