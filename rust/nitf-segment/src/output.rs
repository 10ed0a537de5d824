//! References to the output destination a segment is written to.

use std::sync::Arc;

use nitf_common::Result;

/// Byte sink behind an [`IoHandle`].
///
/// Implementations (file, blob, stream) live in the I/O layer; this core only
/// needs the capability to push bytes at the destination.
pub trait OutputWrite: Send + Sync + 'static {
    /// Appends the entire buffer to the destination.
    fn write_all(&self, buf: &[u8]) -> Result<()>;
}

/// A cheap, cloneable reference to the output destination of a segment.
///
/// Writers reference the destination, they never own it; the handle carries
/// identity rather than content, so two clones of the same handle compare
/// equal under [`same_handle`](IoHandle::same_handle) while handles over
/// distinct destinations do not.
#[derive(Clone)]
pub struct IoHandle {
    inner: Arc<dyn OutputWrite>,
}

impl IoHandle {
    /// Creates a handle over the given destination.
    pub fn new(inner: Arc<dyn OutputWrite>) -> IoHandle {
        IoHandle { inner }
    }

    /// Returns the underlying byte sink.
    pub fn writer(&self) -> &dyn OutputWrite {
        self.inner.as_ref()
    }

    /// Returns `true` when both handles reference the same destination.
    pub fn same_handle(a: &IoHandle, b: &IoHandle) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::fmt::Debug for IoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoHandle").finish_non_exhaustive()
    }
}
