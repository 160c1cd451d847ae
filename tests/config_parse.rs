use quire::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../quire.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.chunking.pages_per_chunk, 10);
    assert!(!cfg.paths.spool_dir.is_empty());
    assert_eq!(cfg.broker.max_retries, 0);
    assert_eq!(cfg.docling.env.get("CUDA_VISIBLE_DEVICES").map(String::as_str), Some(""));
}

#[test]
fn missing_sections_take_defaults() {
    let cfg: Config = toml::from_str("[chunking]\npages_per_chunk = 4\n").expect("parse TOML");
    assert_eq!(cfg.chunking.pages_per_chunk, 4);
    assert_eq!(cfg.poller.interval_ms, 100);
    assert_eq!(cfg.worker.jitter_max_ms, 5_000);
    assert!(cfg.broker.time_limit().is_some());
}
