use crate::chunk_plan::ChunkSpec;
use crate::document::extract_range;
use crate::engine::ConversionEngine;
use crate::error::PipelineError;
use crate::runtime::RuntimeGuard;
use anyhow::Context;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

/// The first call in a process may construct the engine.
pub fn process<E: ConversionEngine>(
    guard: &RuntimeGuard<E>,
    source_path: &str,
    spec: &ChunkSpec,
) -> Result<String, PipelineError> {
    let pid = std::process::id();
    let started = Instant::now();

    let result = guard.get_engine().and_then(|engine| {
        let pdf = extract_range(Path::new(source_path), spec.start_page, spec.end_page)?;
        engine
            .convert(&format!("chunk_{}.pdf", spec.index), &pdf)
            .with_context(|| format!("convert pages {}..{}", spec.start_page, spec.end_page))
    });

    match result {
        Ok(markdown) => {
            info!(
                "chunk ok chunk={} pid={pid} pages={}..{} n={} time={:.2}s chars={}",
                spec.index,
                spec.start_page,
                spec.end_page,
                spec.page_count(),
                started.elapsed().as_secs_f64(),
                markdown.len()
            );
            Ok(markdown)
        }
        Err(err) => {
            error!("chunk failed chunk={} pid={pid} err={err:#}", spec.index);
            Err(PipelineError::chunk(spec.index, format!("{err:#}")))
        }
    }
}
