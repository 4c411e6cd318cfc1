//! The generic container layer (LBCF / "C1"): chunked, compressed,
//! CRC-checked byte blobs with a trailing descriptor and chunk index.

pub mod records;
pub mod writer;

pub use records::{
    ChunkTableEntry, ChunkTableIndexEntry, DescriptorHeader, FileHeader, DESCRIPTOR_SIGNATURE,
    FILE_SIGNATURE,
};
pub use writer::ContainerWriter;
