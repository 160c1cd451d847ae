use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub index: u32,
    pub start_page: u32, // 0-based inclusive
    pub end_page: u32,   // 0-based exclusive
}

impl ChunkSpec {
    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub page_count: u32,
    pub chunk_size: u32,
    pub chunks: Vec<ChunkSpec>,
}

impl ChunkPlan {
    pub fn new(page_count: u32, chunk_size: u32) -> Result<Self, PipelineError> {
        Ok(Self {
            page_count,
            chunk_size,
            chunks: plan(page_count, chunk_size)?,
        })
    }
}

pub fn plan(total_pages: u32, chunk_size: u32) -> Result<Vec<ChunkSpec>, PipelineError> {
    if chunk_size == 0 {
        return Err(PipelineError::InvalidArgument(
            "chunk_size must be at least 1".into(),
        ));
    }

    let mut chunks = Vec::with_capacity(total_pages.div_ceil(chunk_size) as usize);
    let mut start = 0u32;
    let mut index = 0u32;

    while start < total_pages {
        let end = start.saturating_add(chunk_size).min(total_pages);
        chunks.push(ChunkSpec {
            index,
            start_page: start,
            end_page: end,
        });
        start = end;
        index += 1;
    }

    Ok(chunks)
}
