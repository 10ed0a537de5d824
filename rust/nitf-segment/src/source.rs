//! Data-source capability feeding a segment.

use std::sync::Arc;

use nitf_common::Result;

/// A capability that can supply the bytes of one segment on demand.
///
/// How the bytes are produced (memory buffer, file region, band interleave)
/// is up to the implementation; the writer only queries validity and size and
/// eventually pulls bytes during the write pass. The source's own teardown
/// remains the responsibility of whoever created it.
pub trait SegmentSource: Send + Sync + 'static {
    /// Returns `false` once the source's backing state has been torn down.
    ///
    /// A writer refuses to attach an invalid source.
    fn is_valid(&self) -> bool;

    /// Total number of bytes this source will produce.
    fn size(&self) -> u64;

    /// Reads up to `buf.len()` bytes starting at `pos` into `buf`, returning
    /// the number of bytes read.
    fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize>;
}

/// A cheap, cloneable reference to a [`SegmentSource`].
///
/// Attachment hands the writer a counted reference, not ownership; identity
/// comparisons go through [`same_source`](SourceRef::same_source).
#[derive(Clone)]
pub struct SourceRef {
    inner: Arc<dyn SegmentSource>,
}

impl SourceRef {
    /// Creates a reference over the given source.
    pub fn new(inner: Arc<dyn SegmentSource>) -> SourceRef {
        SourceRef { inner }
    }

    /// Returns the underlying source.
    pub fn get(&self) -> &dyn SegmentSource {
        self.inner.as_ref()
    }

    /// Returns `true` when both references point at the same source.
    pub fn same_source(a: &SourceRef, b: &SourceRef) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRef")
            .field("size", &self.inner.size())
            .finish_non_exhaustive()
    }
}
