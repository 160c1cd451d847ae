use quire::chunk_plan::{plan, ChunkPlan, ChunkSpec};
use quire::error::PipelineError;

#[test]
fn chunk_plan_basic() {
    let chunks = plan(25, 10).unwrap();
    assert_eq!(
        chunks,
        vec![
            ChunkSpec { index: 0, start_page: 0, end_page: 10 },
            ChunkSpec { index: 1, start_page: 10, end_page: 20 },
            ChunkSpec { index: 2, start_page: 20, end_page: 25 },
        ]
    );
}

#[test]
fn chunks_partition_the_page_range() {
    for total in 0..=60u32 {
        for size in 1..=13u32 {
            let chunks = plan(total, size).unwrap();
            assert_eq!(chunks.len() as u32, total.div_ceil(size), "total={total} size={size}");

            let mut expected_start = 0;
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.index as usize, i);
                assert_eq!(c.start_page, expected_start);
                assert!(c.end_page > c.start_page);
                assert!(c.page_count() <= size);
                expected_start = c.end_page;
            }
            assert_eq!(expected_start, total);
        }
    }
}

#[test]
fn zero_pages_yields_no_chunks() {
    assert!(plan(0, 10).unwrap().is_empty());
    let p = ChunkPlan::new(0, 10).unwrap();
    assert_eq!(p.page_count, 0);
    assert!(p.chunks.is_empty());
}

#[test]
fn zero_chunk_size_is_rejected() {
    let err = plan(10, 0).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidArgument(_)));
}

#[test]
fn chunk_larger_than_document() {
    let chunks = plan(3, 100).unwrap();
    assert_eq!(chunks, vec![ChunkSpec { index: 0, start_page: 0, end_page: 3 }]);
}
