//! Fixed-layout structures written by the container (LBCF) format.
//!
//! See <spec §3> for the byte layout this module pins down. All structures
//! derive [`binrw::BinRead`]/[`binrw::BinWrite`] so the field order in the
//! struct definition is exactly the field order on disk, with no implicit
//! padding. Endianness is fixed at the call site with `.read_le()`/
//! `.write_le()` rather than baked into the struct.

use std::mem::size_of;

use binrw::{BinRead, BinWrite};
use static_assertions::const_assert_eq;

/// `"LBCF$11" + 0x1A`, byte-exact including the trailing substitute/EOF marker.
pub const FILE_SIGNATURE: u64 = u64::from_le_bytes(*b"LBCF$11\x1A");
/// `"LBCF$D11"`, byte-exact.
pub const DESCRIPTOR_SIGNATURE: u64 = u64::from_le_bytes(*b"LBCF$D11");

/// Chunk-table-segment capacity before it is flushed as its own compressed block.
pub const CHUNK_TABLE_SEGMENT_ENTRY_COUNT: usize = 4 * 1024 * 1024;
/// Initial growable capacity of the in-memory chunk-table-index array.
pub const CHUNK_TABLE_INDEX_CAPACITY_INITIAL: usize = 65536;

/// The 48-byte file header, always at offset 0.
///
/// spec.md states this header is "always 40 bytes" but then lists 5×`u64` +
/// 2×`u32` fields, which is 48 bytes and matches `SLBCFFileHeader` in the
/// original C++ source exactly. We follow the original struct (see
/// DESIGN.md, Open Question 1) and size everything off [`FileHeader::SIZE`]
/// rather than a hardcoded constant, so the two numbers can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
pub struct FileHeader {
    pub signature: u64,
    pub file_size: u64,
    pub descriptor_offset: u64,
    pub descriptor_size_uncompressed: u64,
    pub descriptor_size_compressed: u64,
    pub descriptor_checksum: u32,
    pub header_checksum: u32,
}

impl FileHeader {
    pub const SIZE: u64 = size_of::<u64>() as u64 * 5 + size_of::<u32>() as u64 * 2;
    /// Number of leading bytes covered by `header_checksum`: everything but
    /// the checksum field itself.
    pub const CHECKSUM_RANGE: u64 = Self::SIZE - size_of::<u32>() as u64;
}

const_assert_eq!(FileHeader::SIZE, 48);

/// Header of the trailing descriptor block (spec.md §3 "Descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
pub struct DescriptorHeader {
    pub signature: u64,
    pub chunk_table_index_offset: u64,
    pub chunk_table_index_entry_count: u64,
    pub user_data_offset: u64,
    pub user_data_size: u64,
}

impl DescriptorHeader {
    pub const SIZE: u64 = size_of::<u64>() as u64 * 5;
}

const_assert_eq!(DescriptorHeader::SIZE, 40);

/// One persisted chunk's location and size, 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
pub struct ChunkTableEntry {
    pub offset: u64,
    pub size_uncompressed: u32,
    /// Includes the trailing CRC32 appended after the compressed payload.
    pub size_compressed: u32,
}

impl ChunkTableEntry {
    pub const SIZE: u64 = size_of::<u64>() as u64 + size_of::<u32>() as u64 * 2;
}

const_assert_eq!(ChunkTableEntry::SIZE, 16);

/// Points at one flushed chunk-table segment.
///
/// `size_compressed` here does *not* describe the bytes written at `offset`
/// — see [`crate::container::writer::ContainerWriter::flush_chunk_table_segment`]
/// and DESIGN.md, Open Question 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
pub struct ChunkTableIndexEntry {
    pub offset: u64,
    pub entry_count: u32,
    pub size_compressed: u32,
    pub checksum: u32,
}

impl ChunkTableIndexEntry {
    pub const SIZE: u64 = size_of::<u64>() as u64 + size_of::<u32>() as u64 * 3;
}

const_assert_eq!(ChunkTableIndexEntry::SIZE, 20);

/// Rounds `len` up to the next multiple of 16, as required for each
/// descriptor section before concatenation (spec.md §3, §6).
pub fn pad16(len: usize) -> usize {
    (len + 15) & !15
}
