use thiserror::Error;

/// The maximum size of a single chunk passed to [`ContainerWriter::append_chunk`](crate::container::ContainerWriter::append_chunk).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum LbtError {
    #[error("chunk of {0} bytes exceeds the {} byte maximum", MAX_CHUNK_SIZE)]
    ChunkTooLarge(usize),
    #[error("compression failed: {0}")]
    CompressionFailed(std::io::Error),
    #[error("{0}")]
    FileIo(#[from] std::io::Error),
    #[error("{0}")]
    ContractViolation(String),
}

pub type LbtResult<T> = Result<T, LbtError>;
