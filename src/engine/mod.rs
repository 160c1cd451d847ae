pub mod docling;
pub mod types;

use crate::document::synthetic_pdf;
use anyhow::Result;
use std::time::Duration;
use thiserror::Error;

pub use docling::DoclingEngine;
pub use types::{ConvertRequest, ConvertResponse, EngineDiag, ReadyLine};

/// Implementations must tolerate sequential use from many tasks through `&self`.
pub trait ConversionEngine: Send + Sync {
    fn convert(&self, name: &str, pdf: &[u8]) -> Result<String>;

    fn warmup(&self) -> Result<()> {
        let blank = synthetic_pdf(&[""])?;
        self.convert("warmup.pdf", &blank).map(|_| ())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Faults after which the engine can no longer serve requests.
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("engine exceeded time limit ({0:?})")]
    TimeLimit(Duration),
    #[error("engine process exited: {0}")]
    Exited(String),
}
