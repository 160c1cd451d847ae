#![allow(dead_code)]

use anyhow::{anyhow, Result};
use quire::document::synthetic_pdf;
use quire::engine::ConversionEngine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Engine that reports the text of each page it receives.
///
/// Conversions of names listed in `fail_names` return an error.
#[derive(Debug)]
pub struct FakeEngine {
    pub fail_names: Vec<String>,
    pub fail_warmup: bool,
    pub converts: Arc<AtomicUsize>,
    pub healthy: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            fail_names: Vec::new(),
            fail_warmup: false,
            converts: Arc::new(AtomicUsize::new(0)),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn failing(names: &[&str]) -> Self {
        Self {
            fail_names: names.iter().map(|s| s.to_string()).collect(),
            ..Self::new()
        }
    }
}

impl ConversionEngine for FakeEngine {
    fn convert(&self, name: &str, pdf: &[u8]) -> Result<String> {
        self.converts.fetch_add(1, Ordering::SeqCst);
        if name == "warmup.pdf" && self.fail_warmup {
            return Err(anyhow!("warmup refused"));
        }
        if self.fail_names.iter().any(|n| n == name) {
            return Err(anyhow!("cannot convert {name}"));
        }
        let doc = lopdf::Document::load_mem(pdf)?;
        Ok(format!("{name} pages={}", doc.get_pages().len()))
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Write a PDF whose page `i` reads `page i` to `dir/name`.
pub fn write_pdf(dir: &Path, name: &str, pages: u32) -> PathBuf {
    let texts: Vec<String> = (0..pages).map(|i| format!("page {i}")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let bytes = synthetic_pdf(&refs).expect("synthetic pdf");
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write pdf");
    path
}
