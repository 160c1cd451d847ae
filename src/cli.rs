use crate::{
    broker::SpoolBroker,
    chunk_plan::ChunkPlan,
    config::Config,
    document,
    engine::DoclingEngine,
    pipeline::{group_id, Pipeline},
    poller::Progress,
    runtime::{Jitter, RuntimeGuard},
    util::ensure_dir,
    worker::{Worker, WorkerOptions},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(about = "Chunked PDF transcription over a worker pool (Docling + spool broker + ordered merge)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./quire.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the conversion engine once and report what it loaded.
    Doctor {},
    /// Print the chunk plan for a document.
    Plan {
        #[arg(long)]
        input: PathBuf,
    },
    /// Dispatch a document to the worker pool and write the merged transcript.
    Run {
        #[arg(long)]
        input: PathBuf,
        /// Output path. Defaults to <out_dir>/<input stem>.<extension>.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Consume chunk tasks from the spool.
    Worker {
        /// Exit once no message is due instead of waiting for more.
        #[arg(long)]
        burst: bool,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = Config::load(&cfg_path)?;

    let log_path = resolve_log_path(&cfg, &args.cmd);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Plan { input } => plan(&cfg, input),
        Command::Run { input, output } => run(&cfg, input, output.as_deref()),
        Command::Worker { burst } => worker(&cfg, *burst),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("quire.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("quire.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config, cmd: &Command) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    // Workers run many per host; give each process its own file.
    let name = match cmd {
        Command::Worker { .. } => format!("quire-worker-{}.log", std::process::id()),
        Command::Run { .. } => "quire-run.log".to_string(),
        Command::Plan { .. } | Command::Doctor {} => "quire.log".to_string(),
    };
    Some(PathBuf::from(&cfg.paths.out_dir).join("logs").join(name))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine_cfg = cfg.clone();
    let guard = RuntimeGuard::new(Jitter::NONE, move || DoclingEngine::spawn(&engine_cfg));
    let engine = guard.get_engine()?;
    let broker = SpoolBroker::from_config(cfg)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "engine": engine.diag(),
            "spool": {
                "root": cfg.paths.spool_dir,
                "queue": cfg.broker.queue,
                "ready": broker.ready_len()?,
                "claimed": broker.claimed_len()?,
            },
        }))?
    );
    Ok(())
}

fn plan(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input)?;
    let probe = document::probe_pdf(cfg, input)?;
    let plan = ChunkPlan::new(probe.page_count, cfg.chunking.pages_per_chunk)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn run(cfg: &Config, input: &Path, output: Option<&Path>) -> Result<()> {
    validate_input(cfg, input)?;

    let out_path = match output {
        Some(p) => p.to_path_buf(),
        None => default_output_path(cfg, input)?,
    };
    if let Some(parent) = out_path.parent() {
        ensure_dir(parent)?;
    }

    let group = group_id(cfg, input)?;
    info!("group_id={group} out={}", out_path.display());

    let broker = SpoolBroker::from_config(cfg)?;
    let pipeline = Pipeline::new(cfg, &broker);

    let print_progress = cfg.global.print_progress;
    if print_progress {
        println!("{:<10} | {:<10} | {:<10}", "TIME", "COMPLETED", "PROGRESS");
        println!("{}", "-".repeat(36));
    }
    let result = pipeline.run_document(input, &group, |p: &Progress| {
        info!("progress completed={}/{} elapsed={:.1}s", p.completed, p.total, p.elapsed.as_secs_f64());
        if print_progress {
            println!(
                "{:>8.1}s | {:>4}/{:<5} | {:>8.1}%",
                p.elapsed.as_secs_f64(),
                p.completed,
                p.total,
                p.percent()
            );
        }
    })?;

    std::fs::write(&out_path, &result.artifact.text)
        .with_context(|| format!("write artifact: {}", out_path.display()))?;

    let report_path = out_path.with_extension("report.json");
    if cfg.output.write_report_json {
        std::fs::write(&report_path, serde_json::to_string_pretty(&result.report)?)?;
    }

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(out_path.with_extension("config.toml"), raw)?;
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "group_id": group,
                "output": out_path,
                "report": cfg.output.write_report_json.then_some(&report_path),
                "stats": result.artifact.stats,
            }))?
        );
    }

    Ok(())
}

fn worker(cfg: &Config, burst: bool) -> Result<()> {
    let engine_cfg = cfg.clone();
    let guard = RuntimeGuard::new(Jitter::from_config(cfg), move || {
        DoclingEngine::spawn(&engine_cfg)
    });
    let broker = SpoolBroker::from_config(cfg)?;
    Worker::new(&broker, &guard, WorkerOptions::from_config(cfg)).run(burst)?;
    Ok(())
}

fn default_output_path(cfg: &Config, input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("input has no file name: {}", input.display()))?;
    Ok(PathBuf::from(&cfg.paths.out_dir).join(format!("{stem}.{}", cfg.output.extension)))
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str()) {
        if !ext.eq_ignore_ascii_case("pdf") {
            return Err(anyhow!("input is not a PDF: {}", input.display()));
        }
    } else {
        warn!("input has no extension; assuming PDF: {}", input.display());
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}
