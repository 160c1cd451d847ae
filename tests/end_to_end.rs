mod common;

use common::FakeEngine;
use quire::broker::SpoolBroker;
use quire::config::Config;
use quire::document::synthetic_pdf;
use quire::merge::{chunk_delimiter, FAILED_MARKER};
use quire::pipeline::{Pipeline, RunOutput};
use quire::runtime::{Jitter, RuntimeGuard};
use quire::worker::{Step, Worker, WorkerOptions};
use std::path::Path;
use std::time::Duration;

fn test_config(spool: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.spool_dir = spool.display().to_string();
    cfg.chunking.pages_per_chunk = 10;
    cfg.poller.interval_ms = 5;
    cfg.poller.deadline_seconds = 30;
    cfg
}

/// Run the pipeline on one thread while a worker drains the spool on this one.
fn run_with_worker(cfg: &Config, input: &Path, engine: fn() -> FakeEngine) -> RunOutput {
    let broker = SpoolBroker::from_config(cfg).unwrap();
    let guard = RuntimeGuard::new(Jitter::NONE, move || Ok(engine()));
    let worker = Worker::new(&broker, &guard, WorkerOptions::from_config(cfg));
    let pipeline = Pipeline::new(cfg, &broker);

    std::thread::scope(|s| {
        let run = s.spawn(|| pipeline.run_document(input, "e2e", |_| {}));
        while !run.is_finished() {
            if worker.run_once().unwrap() == Step::Idle {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        run.join().unwrap().unwrap()
    })
}

#[test]
fn failed_chunk_is_marked_in_document_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_pdf(dir.path(), "doc.pdf", 25);
    let cfg = test_config(&dir.path().join("spool"));

    let out = run_with_worker(&cfg, &input, || FakeEngine::failing(&["chunk_1.pdf"]));

    let expected = format!(
        "{}chunk_0.pdf pages=10{}{}{}chunk_2.pdf pages=5",
        chunk_delimiter(0),
        chunk_delimiter(1),
        FAILED_MARKER,
        chunk_delimiter(2)
    );
    assert_eq!(out.artifact.text, expected);
    assert_eq!(out.artifact.stats.total_pages, 25);
    assert_eq!(out.artifact.stats.succeeded, 2);
    assert_eq!(out.artifact.stats.failed, 1);

    let reports = &out.report.chunk_reports;
    assert_eq!(reports.len(), 3);
    assert!(reports[0].ok && !reports[1].ok && reports[2].ok);
    assert_eq!((reports[2].start_page, reports[2].end_page), (20, 25));
    assert!(reports[1].error.as_deref().unwrap_or("").contains("chunk_1.pdf"));
}

#[test]
fn zero_page_document_produces_empty_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.pdf");
    std::fs::write(&input, synthetic_pdf(&[]).unwrap()).unwrap();
    let cfg = test_config(&dir.path().join("spool"));

    let broker = SpoolBroker::from_config(&cfg).unwrap();
    let out = Pipeline::new(&cfg, &broker)
        .run_document(&input, "empty", |_| panic!("no progress expected"))
        .unwrap();

    assert!(out.artifact.text.is_empty());
    assert_eq!(out.artifact.stats.chunk_count, 0);
    assert_eq!(broker.ready_len().unwrap(), 0);
}

#[test]
fn invalid_chunk_size_aborts_before_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::write_pdf(dir.path(), "doc.pdf", 3);
    let mut cfg = test_config(&dir.path().join("spool"));
    cfg.chunking.pages_per_chunk = 0;

    let broker = SpoolBroker::from_config(&cfg).unwrap();
    let err = Pipeline::new(&cfg, &broker)
        .run_document(&input, "bad", |_| {})
        .err()
        .expect("planning must fail");
    assert!(err.to_string().contains("chunk_size"));
    assert_eq!(broker.ready_len().unwrap(), 0);
}
