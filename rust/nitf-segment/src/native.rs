//! Ownership of native NITF library resources.
//!
//! The native library allocates and frees the records behind segment writers;
//! on the Rust side each such record is held through a [`NativeHandle`] that
//! guarantees the matching destructor runs exactly once and that no operation
//! can reach the address afterwards.

use std::ffi::c_void;
use std::ptr::NonNull;

use nitf_common::{Result, error::Error};

/// Destructor for the native resource behind a [`NativeHandle`].
///
/// Supplied by the factory that produced the address, typically a thin closure
/// over the matching `nitf_*_destruct` call. Boxing the call keeps the
/// `unsafe` foreign invocation at the factory, which is the party that can
/// vouch for the address.
pub type ReleaseFn = Box<dyn FnOnce(NonNull<c_void>) + Send>;

/// An exclusively owned reference to memory allocated and freed by the native
/// NITF library.
///
/// The handle is either live or destroyed. [`destroy`](NativeHandle::destroy)
/// flips it to destroyed and runs the release function exactly once; every
/// later operation fails instead of touching freed memory. A handle that is
/// still live when dropped releases the resource as a backstop.
///
/// The raw address is never exposed to callers. The handle itself performs no
/// locking; owners that share an instance across threads serialize access
/// (see [`SegmentWriter`](crate::SegmentWriter)).
pub struct NativeHandle {
    state: Option<Live>,
}

struct Live {
    addr: NonNull<c_void>,
    release: ReleaseFn,
}

impl NativeHandle {
    /// Wraps `addr` together with the destructor that will eventually release
    /// it.
    ///
    /// Fails with an invalid-handle error when `addr` is null; in that case
    /// `release` is discarded without being invoked and nothing is registered
    /// for later destruction.
    pub fn new(addr: *mut c_void, release: ReleaseFn) -> Result<NativeHandle> {
        let addr = NonNull::new(addr)
            .ok_or_else(|| Error::invalid_handle("null native address"))?;
        Ok(NativeHandle {
            state: Some(Live { addr, release }),
        })
    }

    /// Returns `true` until the handle has been destroyed.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.state.is_some()
    }

    /// Fails with a use-after-destroy error if the handle has been destroyed.
    ///
    /// `operation` names the caller and is carried in the error for
    /// diagnostics.
    pub fn ensure_live(&self, operation: &str) -> Result<()> {
        if self.state.is_some() {
            Ok(())
        } else {
            Err(Error::use_after_destroy(operation))
        }
    }

    /// Releases the native resource.
    ///
    /// The handle is marked destroyed before the foreign call runs, so even a
    /// panicking destructor cannot leave a live-looking handle over freed
    /// memory. A second call fails with [`ErrorKind::AlreadyDestroyed`] and
    /// never reaches the destructor again.
    ///
    /// [`ErrorKind::AlreadyDestroyed`]: nitf_common::error::ErrorKind::AlreadyDestroyed
    pub fn destroy(&mut self) -> Result<()> {
        let Live { addr, release } = self.state.take().ok_or_else(Error::already_destroyed)?;
        release(addr);
        Ok(())
    }
}

impl Drop for NativeHandle {
    /// Releases the native resource if the owner never destroyed the handle
    /// explicitly.
    fn drop(&mut self) {
        if let Some(Live { addr, release }) = self.state.take() {
            log::warn!("native handle at {addr:p} dropped while live; releasing");
            release(addr);
        }
    }
}

// SAFETY: the handle owns the native resource exclusively and the raw address
// is never aliased on the Rust side, so moving the handle between threads is
// sound. Shared access is serialized by the owning type.
unsafe impl Send for NativeHandle {}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            Some(live) => f
                .debug_struct("NativeHandle")
                .field("addr", &live.addr)
                .field("live", &true)
                .finish(),
            None => f
                .debug_struct("NativeHandle")
                .field("live", &false)
                .finish(),
        }
    }
}
