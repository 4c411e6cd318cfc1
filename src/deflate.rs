//! Raw-deflate (RFC 1951, no zlib wrapper) compression helpers.
//!
//! The container format always stores raw deflate streams: chunk data and
//! chunk-table segments at the fastest level, the descriptor block at the
//! best level. See spec §6.

use std::io::Write;

use flate2::{write::DeflateEncoder, Compression};

use crate::error::{LbtError, LbtResult};

/// Fastest deflate level, used for chunk data and chunk-table segments.
pub const LEVEL_MINIMUM: Compression = Compression::fast();
/// Best deflate level, used for the descriptor block.
pub const LEVEL_MAXIMUM: Compression = Compression::best();

/// Compresses `data` as a raw deflate stream at the given level.
pub fn compress(data: &[u8], level: Compression) -> LbtResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len()), level);
    encoder.write_all(data).map_err(LbtError::CompressionFailed)?;
    encoder.finish().map_err(LbtError::CompressionFailed)
}
