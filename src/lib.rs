//! Writer for the Loki binary container format (LBCF) and the trace-stream
//! format (LBT) built on top of it.
//!
//! [`container`] is the generic, append-only, chunked/compressed/checksummed
//! byte-blob container. [`trace`] layers a fixed-schema execution-trace
//! stream — column-transposed and delta-encoded record chunks, plus optional
//! memory-image snapshots — on top of a container.
//!
//! Only writing is in scope; there is no reader here.

pub mod container;
mod deflate;
pub mod error;
pub mod trace;

pub use container::ContainerWriter;
pub use error::{LbtError, LbtResult};
pub use trace::TraceWriter;
