use crate::config::Config;
use crate::engine::ConversionEngine;
use anyhow::Result;
use once_cell::sync::OnceCell;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

type Factory<E> = Box<dyn Fn() -> Result<E> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub const NONE: Jitter = Jitter {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn from_config(cfg: &Config) -> Self {
        let min = Duration::from_millis(cfg.worker.jitter_min_ms);
        let max = Duration::from_millis(cfg.worker.jitter_max_ms.max(cfg.worker.jitter_min_ms));
        Self { min, max }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

pub struct RuntimeGuard<E> {
    cell: OnceCell<Arc<E>>,
    jitter: Jitter,
    factory: Factory<E>,
}

impl<E: ConversionEngine> RuntimeGuard<E> {
    pub fn new(jitter: Jitter, factory: impl Fn() -> Result<E> + Send + Sync + 'static) -> Self {
        Self {
            cell: OnceCell::new(),
            jitter,
            factory: Box::new(factory),
        }
    }

    /// Return the process engine, constructing it on first use.
    ///
    /// Concurrent first callers block until one of them finishes construction.
    /// A construction error is returned and the next call tries again.
    pub fn get_engine(&self) -> Result<Arc<E>> {
        self.cell.get_or_try_init(|| self.init()).cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    fn init(&self) -> Result<Arc<E>> {
        let pid = std::process::id();
        let delay = self.jitter.sample();
        if !delay.is_zero() {
            info!("engine jitter pid={pid} sleep={:.2}s", delay.as_secs_f64());
            std::thread::sleep(delay);
        }

        info!("engine load start pid={pid}");
        let started = Instant::now();
        let engine = (self.factory)()?;

        if let Err(err) = engine.warmup() {
            warn!("engine warmup failed pid={pid} (ignored): {err:#}");
        }

        info!(
            "engine ready pid={pid} took={:.2}s",
            started.elapsed().as_secs_f64()
        );
        Ok(Arc::new(engine))
    }
}
