//! Fixed-layout structures written by the trace (LBT) format on top of a
//! [container](crate::container).

use std::mem::size_of;

use binrw::{BinRead, BinWrite};
use static_assertions::const_assert_eq;

/// `"LBT$1$2" + 0x1A`, byte-exact including the trailing substitute/EOF marker.
pub const TRACE_TRAILER_SIGNATURE: u64 = u64::from_le_bytes(*b"LBT$1$2\x1A");

pub const FORMAT_BASIC_CORE_TRACE: u64 = 1;
pub const FORMAT_EXTENDED_CORE_TRACE: u64 = 2;

/// Record-buffer capacity before a flush transposes and emits a chunk.
pub const CHUNK_RECORD_COUNT: usize = 2 * 1024 * 1024;
/// Chunk-index-segment capacity before it is flushed as its own chunk.
pub const INDEX_SEGMENT_ENTRY_COUNT: usize = 8 * 1024 * 1024;
/// Size of each blob a memory image is split into.
pub const MEMORY_IMAGE_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// The kind of event a [`TraceRecord`] describes.
///
/// Values match the original wire encoding exactly; new variants must not
/// reuse or reorder existing ones.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Nop = 1,
    Alu1 = 2,
    Alu2 = 3,
    Fetch = 4,
    ScratchpadRead = 5,
    ScratchpadWrite = 6,
    LoadImmediate = 7,
    SystemCall = 8,
    Control = 9,
    LoadWord = 10,
    LoadHalfWord = 11,
    LoadByte = 12,
    StoreWord = 13,
    StoreHalfWord = 14,
    StoreByte = 15,
}

/// Bitwise flag values packed into [`TraceRecord::flags`].
pub mod flag {
    pub const END_OF_PACKET: u8 = 0x1;
    pub const INPUT_CHANNEL_1: u8 = 0x2;
    pub const INPUT_CHANNEL_2: u8 = 0x4;
    pub const NOT_EXECUTED: u8 = 0x8;
}

/// One extended-core-trace record, 24 bytes, as it sits in a column of the
/// transposed record chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
pub struct TraceRecord {
    pub cycle_number: u64,
    pub instruction_address: u32,
    pub memory_address: u32,
    pub operation_type: u8,
    pub parameter1: u8,
    pub parameter2: u8,
    pub flags: u8,
    pub memory_data: u32,
}

impl TraceRecord {
    pub const SIZE: u64 = size_of::<u64>() as u64
        + size_of::<u32>() as u64 * 3
        + size_of::<u8>() as u64 * 4;
}

const_assert_eq!(TraceRecord::SIZE, 24);

/// The C2 user-data blob stored in the container descriptor at `flush`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
pub struct TraceTrailerHeader {
    pub signature: u64,
    pub format: u64,
    pub index_table_chunk_number: u64,
    pub index_table_entry_count: u64,
    pub trace_chunk_count: u64,
    pub record_count: u64,
    pub memory_size: u64,
    pub initial_image_index_chunk_number: u64,
    pub final_image_index_chunk_number: u64,
}

impl TraceTrailerHeader {
    pub const SIZE: u64 = size_of::<u64>() as u64 * 9;
}

const_assert_eq!(TraceTrailerHeader::SIZE, 72);
