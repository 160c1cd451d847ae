mod common;

use quire::config::Config;
use quire::document::{extract_range, page_count, probe_pdf, synthetic_pdf};

#[test]
fn extracts_exact_page_range() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "src.pdf", 25);
    assert_eq!(page_count(&src).unwrap(), 25);

    let bytes = extract_range(&src, 20, 25).unwrap();
    let sub = lopdf::Document::load_mem(&bytes).unwrap();
    let pages = sub.get_pages();
    assert_eq!(pages.len(), 5);

    let first = *pages.values().next().unwrap();
    let content = sub.get_page_content(first).unwrap();
    let content = String::from_utf8_lossy(&content);
    assert!(content.contains("(page 20)"), "got {content:?}");
}

#[test]
fn rejects_out_of_range_and_empty_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "src.pdf", 3);
    assert!(extract_range(&src, 2, 4).is_err());
    assert!(extract_range(&src, 2, 2).is_err());
}

#[test]
fn missing_or_malformed_source_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(extract_range(&dir.path().join("nope.pdf"), 0, 1).is_err());

    let junk = dir.path().join("junk.pdf");
    std::fs::write(&junk, b"not a pdf").unwrap();
    assert!(extract_range(&junk, 0, 1).is_err());
}

#[test]
fn probe_enforces_page_limit() {
    let dir = tempfile::tempdir().unwrap();
    let src = common::write_pdf(dir.path(), "src.pdf", 4);

    let mut cfg = Config::default();
    let probe = probe_pdf(&cfg, &src).unwrap();
    assert_eq!(probe.page_count, 4);
    assert!(probe.file_bytes > 0);

    cfg.limits.max_input_pages = 3;
    assert!(probe_pdf(&cfg, &src).is_err());
}

#[test]
fn zero_page_document_probes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.pdf");
    std::fs::write(&path, synthetic_pdf(&[]).unwrap()).unwrap();
    let probe = probe_pdf(&Config::default(), &path).unwrap();
    assert_eq!(probe.page_count, 0);
}
