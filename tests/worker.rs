mod common;

use common::FakeEngine;
use quire::broker::{Lookup, ResultStore, SpoolBroker, TaskOutcome, TaskQueue};
use quire::chunk_plan::plan;
use quire::dispatch::Dispatcher;
use quire::runtime::{Jitter, RuntimeGuard};
use quire::worker::{Step, Worker, WorkerOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn opts(max_retries: u32) -> WorkerOptions {
    WorkerOptions {
        eager_init: true,
        idle_poll: Duration::from_millis(1),
        maintenance_interval: Duration::from_secs(60),
        lease: Duration::from_secs(60),
        result_ttl: Duration::from_secs(3600),
        max_retries,
        min_backoff_ms: 0,
        max_backoff_ms: 0,
    }
}

#[test]
fn worker_settles_every_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "doc.pdf", 25);
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    let handles = Dispatcher::new(&broker, "g")
        .dispatch(&src.display().to_string(), &plan(25, 10).unwrap())
        .unwrap();

    let guard = RuntimeGuard::new(Jitter::NONE, || Ok(FakeEngine::failing(&["chunk_1.pdf"])));
    let settled = Worker::new(&broker, &guard, opts(0)).run(true).unwrap();
    assert_eq!(settled, 3);

    assert_eq!(
        broker.get(&handles[&0]).unwrap(),
        Lookup::Ready(TaskOutcome::Completed { text: "chunk_0.pdf pages=10".into() })
    );
    assert!(matches!(
        broker.get(&handles[&1]).unwrap(),
        Lookup::Ready(TaskOutcome::Failed { .. })
    ));
    assert_eq!(
        broker.get(&handles[&2]).unwrap(),
        Lookup::Ready(TaskOutcome::Completed { text: "chunk_2.pdf pages=5".into() })
    );
    assert_eq!(broker.ready_len().unwrap(), 0);
    assert_eq!(broker.claimed_len().unwrap(), 0);
}

#[test]
fn failures_are_retried_before_being_reported() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "doc.pdf", 5);
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    let handles = Dispatcher::new(&broker, "g")
        .dispatch(&src.display().to_string(), &plan(5, 10).unwrap())
        .unwrap();

    let guard = RuntimeGuard::new(Jitter::NONE, || Ok(FakeEngine::failing(&["chunk_0.pdf"])));
    let worker = Worker::new(&broker, &guard, opts(2));

    let steps: Vec<Step> = (0..4).map(|_| worker.run_once().unwrap()).collect();
    assert_eq!(
        steps,
        vec![
            Step::Retried { chunk_index: 0, delay: Duration::ZERO },
            Step::Retried { chunk_index: 0, delay: Duration::ZERO },
            Step::Failed { chunk_index: 0 },
            Step::Idle,
        ]
    );
    assert!(matches!(
        broker.get(&handles[&0]).unwrap(),
        Lookup::Ready(TaskOutcome::Failed { .. })
    ));
}

#[test]
fn missing_source_fails_only_that_task() {
    let dir = tempfile::tempdir().unwrap();
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    let handles = Dispatcher::new(&broker, "g")
        .dispatch("/definitely/not/here.pdf", &plan(1, 10).unwrap())
        .unwrap();

    let guard = RuntimeGuard::new(Jitter::NONE, || Ok(FakeEngine::new()));
    let worker = Worker::new(&broker, &guard, opts(0));
    assert_eq!(worker.run_once().unwrap(), Step::Failed { chunk_index: 0 });

    match broker.get(&handles[&0]).unwrap() {
        Lookup::Ready(TaskOutcome::Failed { reason }) => assert!(reason.contains("chunk 0")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn engine_construction_failure_stops_the_worker() {
    let dir = tempfile::tempdir().unwrap();
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    let guard: RuntimeGuard<FakeEngine> =
        RuntimeGuard::new(Jitter::NONE, || Err(anyhow::anyhow!("no models")));
    let err = Worker::new(&broker, &guard, opts(0)).run(true).unwrap_err();
    assert!(format!("{err:#}").contains("no models"));
}

#[test]
fn lazy_engine_failure_returns_the_claimed_message() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "doc.pdf", 2);
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    Dispatcher::new(&broker, "g")
        .dispatch(&src.display().to_string(), &plan(2, 1).unwrap())
        .unwrap();

    let guard: RuntimeGuard<FakeEngine> =
        RuntimeGuard::new(Jitter::NONE, || Err(anyhow::anyhow!("no models")));
    let mut o = opts(0);
    o.eager_init = false;
    let worker = Worker::new(&broker, &guard, o);

    let err = worker.run_once().unwrap_err();
    assert!(format!("{err:#}").contains("no models"));
    assert_eq!(broker.claimed_len().unwrap(), 0);
    assert_eq!(broker.ready_len().unwrap(), 2);
}

#[test]
fn unhealthy_engine_stops_the_worker_after_settling() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "doc.pdf", 2);
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    let handles = Dispatcher::new(&broker, "g")
        .dispatch(&src.display().to_string(), &plan(2, 1).unwrap())
        .unwrap();

    let guard = RuntimeGuard::new(Jitter::NONE, || Ok(FakeEngine::new()));
    let engine = guard.get_engine().unwrap();
    engine.healthy.store(false, Ordering::SeqCst);

    let worker = Worker::new(&broker, &guard, opts(0));
    assert!(worker.run_once().is_err());

    let settled = handles
        .values()
        .filter(|h| matches!(broker.get(h).unwrap(), Lookup::Ready(_)))
        .count();
    assert_eq!(settled, 1);
}

#[test]
fn boot_loads_engine_once_before_any_task() {
    let dir = tempfile::tempdir().unwrap();
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let guard = RuntimeGuard::new(Jitter::NONE, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(FakeEngine::new())
    });

    let worker = Worker::new(&broker, &guard, opts(0));
    worker.boot().unwrap();
    assert!(guard.is_initialized());
    assert_eq!(worker.run(true).unwrap(), 0);
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn maintenance_redelivers_abandoned_claims() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "doc.pdf", 3);
    let broker = SpoolBroker::open(&dir.path().join("spool"), "default", Duration::from_secs(3600)).unwrap();
    Dispatcher::new(&broker, "g")
        .dispatch(&src.display().to_string(), &plan(3, 10).unwrap())
        .unwrap();

    // A worker that died mid-task.
    let _abandoned = broker.claim().unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let guard = RuntimeGuard::new(Jitter::NONE, || Ok(FakeEngine::new()));
    let mut o = opts(0);
    o.lease = Duration::from_millis(1);
    let settled = Worker::new(&broker, &guard, o).run(true).unwrap();
    assert_eq!(settled, 1);
    assert_eq!(broker.claimed_len().unwrap(), 0);
}
