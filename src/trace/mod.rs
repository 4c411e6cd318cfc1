//! The trace-stream layer (LBT / "C2"): fixed-schema execution-trace
//! records, transposed and delta-encoded, on top of a
//! [container](crate::container).

pub mod records;
pub mod writer;

pub use records::{
    flag, OperationType, TraceRecord, TraceTrailerHeader, FORMAT_BASIC_CORE_TRACE,
    FORMAT_EXTENDED_CORE_TRACE, TRACE_TRAILER_SIGNATURE,
};
pub use writer::TraceWriter;
