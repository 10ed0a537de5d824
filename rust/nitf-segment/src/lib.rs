//! Write-side lifecycle management for NITF file segments.
//!
//! The native NITF library owns the memory behind every segment writer; this
//! crate provides the safe shell around it:
//! - [`NativeHandle`]: an exclusively owned reference to a native resource,
//!   released exactly once.
//! - [`SegmentWriter`]: one segment's write path, holding a reference to the
//!   output destination and at most one attached [`SegmentSource`].
//!
//! Segment encoding and actual byte transfer live elsewhere; everything here
//! is concerned with making "destroy races ahead of use" and "double attach"
//! structurally impossible.

pub mod native;
pub mod output;
pub mod source;
pub mod writer;

pub use native::{NativeHandle, ReleaseFn};
pub use output::{IoHandle, OutputWrite};
pub use source::{SegmentSource, SourceRef};
pub use writer::SegmentWriter;
