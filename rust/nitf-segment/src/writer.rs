//! The write path of a single NITF segment.

use std::ffi::c_void;
use std::sync::Mutex;

use nitf_common::{Result, error::Error};

use crate::native::{NativeHandle, ReleaseFn};
use crate::output::IoHandle;
use crate::source::SourceRef;

/// The handle that gives access to writing one segment.
///
/// A writer wraps the native segment-writer record, references (never owns)
/// the output destination, and holds at most one attached [`SourceRef`]. Every
/// public operation runs under one per-instance lock, so reads, the one-time
/// attach, and destruction are mutually exclusive: a caller either completes
/// its operation against a live handle or observes a structured failure,
/// never freed memory.
///
/// Attachment policy: a second [`attach_source`](SegmentWriter::attach_source)
/// is a soft `Ok(false)`, not an error. Destruction policy: a second
/// [`destroy`](SegmentWriter::destroy) fails with `AlreadyDestroyed` and
/// never releases twice.
pub struct SegmentWriter {
    state: Mutex<WriterState>,
}

struct WriterState {
    handle: NativeHandle,
    /// Cleared on destroy; `Some` for as long as the handle is live.
    output: Option<IoHandle>,
    source: SourceSlot,
}

/// Attachment slot; transitions `Empty -> Attached` at most once while the
/// writer is live, and back to `Empty` only when the writer is destroyed.
enum SourceSlot {
    Empty,
    Attached(SourceRef),
}

impl SegmentWriter {
    /// Wraps the native record at `addr`, to be released through `release`,
    /// writing towards `output`.
    ///
    /// Called by the factory that created the native record; fails with an
    /// invalid-handle error on a null address, in which case nothing is
    /// registered for later destruction.
    pub fn new(addr: *mut c_void, release: ReleaseFn, output: IoHandle) -> Result<SegmentWriter> {
        let handle = NativeHandle::new(addr, release)?;
        Ok(SegmentWriter {
            state: Mutex::new(WriterState {
                handle,
                output: Some(output),
                source: SourceSlot::Empty,
            }),
        })
    }

    /// Returns the output destination this segment is written to.
    ///
    /// Fails with a use-after-destroy error once the writer has been
    /// destroyed. The returned handle is a clone of the reference held by the
    /// writer and preserves destination identity.
    pub fn output_handle(&self) -> Result<IoHandle> {
        let state = self.state.lock().unwrap();
        state.handle.ensure_live("output_handle")?;
        state
            .output
            .clone()
            .ok_or_else(|| Error::use_after_destroy("output_handle"))
    }

    /// Returns the currently attached segment source.
    ///
    /// Fails with a no-source-attached error before any successful attach and
    /// with a use-after-destroy error once the writer has been destroyed.
    pub fn segment_source(&self) -> Result<SourceRef> {
        let state = self.state.lock().unwrap();
        state.handle.ensure_live("segment_source")?;
        match &state.source {
            SourceSlot::Attached(source) => Ok(source.clone()),
            SourceSlot::Empty => Err(Error::no_source_attached()),
        }
    }

    /// Attempts to attach `source` as this writer's single data source.
    ///
    /// Returns `Ok(true)` when the slot was empty and `source` is now
    /// attached, or `Ok(false)` when a source is already attached — the slot
    /// is left untouched and the redundant attach is an expected, recoverable
    /// outcome. Fails with an invalid-source error when `source` reports
    /// itself invalid and with a use-after-destroy error once the writer has
    /// been destroyed; failures leave the slot exactly as it was.
    ///
    /// The writer holds a counted reference to the source, not ownership;
    /// tearing the source down remains the caller's responsibility.
    pub fn attach_source(&self, source: SourceRef) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.handle.ensure_live("attach_source")?;
        if !source.get().is_valid() {
            return Err(Error::invalid_source("source backing state is not valid"));
        }
        match state.source {
            SourceSlot::Attached(_) => Ok(false),
            SourceSlot::Empty => {
                state.source = SourceSlot::Attached(source);
                Ok(true)
            }
        }
    }

    /// Destroys the native record behind this writer.
    ///
    /// Drops the references to the output destination and any attached source
    /// (their own lifetimes are unaffected) and releases the native resource
    /// exactly once. A second call fails with `AlreadyDestroyed` and has no
    /// side effects. The lock is held across the native release, so no
    /// concurrent operation can observe a half-destroyed writer.
    pub fn destroy(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.handle.destroy()?;
        state.output = None;
        state.source = SourceSlot::Empty;
        log::debug!("segment writer destroyed");
        Ok(())
    }

    /// Returns `true` once [`destroy`](SegmentWriter::destroy) has completed.
    pub fn is_destroyed(&self) -> bool {
        !self.state.lock().unwrap().handle.is_live()
    }
}

impl std::fmt::Debug for SegmentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("SegmentWriter")
            .field("handle", &state.handle)
            .field(
                "source_attached",
                &matches!(state.source, SourceSlot::Attached(_)),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;

    use nitf_common::Result;
    use nitf_common::error::ErrorKind;

    use crate::native::ReleaseFn;
    use crate::output::{IoHandle, OutputWrite};
    use crate::source::{SegmentSource, SourceRef};

    use super::SegmentWriter;

    struct VecOutput(Mutex<Vec<u8>>);

    impl OutputWrite for VecOutput {
        fn write_all(&self, buf: &[u8]) -> Result<()> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }
    }

    struct StubSource {
        valid: bool,
        bytes: Vec<u8>,
    }

    impl SegmentSource for StubSource {
        fn is_valid(&self) -> bool {
            self.valid
        }

        fn size(&self) -> u64 {
            self.bytes.len() as u64
        }

        fn read(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
            let data = &self.bytes[(pos as usize).min(self.bytes.len())..];
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            Ok(n)
        }
    }

    fn stub_source(bytes: &[u8]) -> SourceRef {
        SourceRef::new(Arc::new(StubSource {
            valid: true,
            bytes: bytes.to_vec(),
        }))
    }

    fn fake_native() -> (*mut c_void, ReleaseFn, Arc<AtomicUsize>) {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let addr = Box::into_raw(Box::new(0u64)) as *mut c_void;
        let release: ReleaseFn = Box::new(move |p| {
            counter.fetch_add(1, Ordering::SeqCst);
            // SAFETY: `p` is the Box allocated above, released at most once.
            drop(unsafe { Box::from_raw(p.as_ptr() as *mut u64) });
        });
        (addr, release, released)
    }

    fn test_writer() -> (SegmentWriter, IoHandle, Arc<AtomicUsize>) {
        let (addr, release, released) = fake_native();
        let output = IoHandle::new(Arc::new(VecOutput(Mutex::new(Vec::new()))));
        let writer = SegmentWriter::new(addr, release, output.clone()).unwrap();
        (writer, output, released)
    }

    #[test]
    fn null_address_is_rejected() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let release: ReleaseFn = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let output = IoHandle::new(Arc::new(VecOutput(Mutex::new(Vec::new()))));
        let err = SegmentWriter::new(ptr::null_mut(), release, output).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidHandle { .. }));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn output_handle_preserves_identity() {
        let (writer, output, _) = test_writer();
        let fetched = writer.output_handle().unwrap();
        assert!(IoHandle::same_handle(&fetched, &output));
    }

    #[test]
    fn source_read_before_attach_fails() {
        let (writer, _, _) = test_writer();
        let err = writer.segment_source().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NoSourceAttached));
    }

    #[test]
    fn attach_is_exclusive() {
        let (writer, _, _) = test_writer();
        let s1 = stub_source(b"first");
        let s2 = stub_source(b"second");

        assert!(writer.attach_source(s1.clone()).unwrap());
        assert!(!writer.attach_source(s2).unwrap());

        let attached = writer.segment_source().unwrap();
        assert!(SourceRef::same_source(&attached, &s1));
    }

    #[test]
    fn invalid_source_is_rejected_without_side_effects() {
        let (writer, _, _) = test_writer();
        let bad = SourceRef::new(Arc::new(StubSource {
            valid: false,
            bytes: Vec::new(),
        }));

        let err = writer.attach_source(bad).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidSource { .. }));

        // The failed attach left the slot empty; a valid attach still works.
        let err = writer.segment_source().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NoSourceAttached));
        assert!(writer.attach_source(stub_source(b"ok")).unwrap());
    }

    #[test]
    fn destroy_releases_exactly_once() {
        let (writer, _, released) = test_writer();
        writer.destroy().unwrap();
        assert!(writer.is_destroyed());
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let err = writer.destroy().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AlreadyDestroyed));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn operations_fail_after_destroy() {
        let (writer, _, _) = test_writer();
        writer.attach_source(stub_source(b"bytes")).unwrap();
        writer.destroy().unwrap();

        let err = writer.output_handle().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UseAfterDestroy { .. }));

        let err = writer.segment_source().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UseAfterDestroy { .. }));

        let err = writer.attach_source(stub_source(b"late")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UseAfterDestroy { .. }));
    }

    #[test]
    fn destroy_races_with_readers() {
        const READERS: usize = 3;

        let (writer, _, released) = test_writer();
        let writer = Arc::new(writer);
        let barrier = Arc::new(Barrier::new(READERS + 1));

        let mut threads = Vec::new();
        for _ in 0..READERS {
            let writer = Arc::clone(&writer);
            let barrier = Arc::clone(&barrier);
            threads.push(thread::spawn(move || {
                barrier.wait();
                // Spin until destruction becomes observable; every failure
                // must be the documented error, never a crash.
                loop {
                    match writer.output_handle() {
                        Ok(_) => thread::yield_now(),
                        Err(err) => {
                            assert!(matches!(err.kind(), ErrorKind::UseAfterDestroy { .. }));
                            break;
                        }
                    }
                }
            }));
        }

        let destroyer = {
            let writer = Arc::clone(&writer);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                writer.destroy().unwrap();
            })
        };

        destroyer.join().unwrap();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_attach_admits_one_source() {
        const ATTACHERS: usize = 4;

        let (writer, _, _) = test_writer();
        let writer = Arc::new(writer);
        let barrier = Arc::new(Barrier::new(ATTACHERS));
        let sources: Vec<SourceRef> = (0..ATTACHERS)
            .map(|i| stub_source(&[i as u8]))
            .collect();

        let threads: Vec<_> = sources
            .iter()
            .map(|source| {
                let writer = Arc::clone(&writer);
                let barrier = Arc::clone(&barrier);
                let source = source.clone();
                thread::spawn(move || {
                    barrier.wait();
                    writer.attach_source(source).unwrap()
                })
            })
            .collect();

        let attached: Vec<bool> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(attached.iter().filter(|&&won| won).count(), 1);

        // The winner's source is the one the writer reports.
        let winner = attached.iter().position(|&won| won).unwrap();
        let current = writer.segment_source().unwrap();
        assert!(SourceRef::same_source(&current, &sources[winner]));
    }
}
