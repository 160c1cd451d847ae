use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dispatch failed: {0}")]
    DispatchFailure(String),

    #[error("chunk {chunk_index} failed: {reason}")]
    ChunkProcessingFailure { chunk_index: u32, reason: String },

    #[error("result lookup failed for {message_id}: {reason}")]
    ResultLookupFailure { message_id: String, reason: String },
}

impl PipelineError {
    pub fn chunk(chunk_index: u32, err: impl std::fmt::Display) -> Self {
        PipelineError::ChunkProcessingFailure {
            chunk_index,
            reason: err.to_string(),
        }
    }
}
