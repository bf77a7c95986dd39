//! System V shared-memory segments holding a single counter.
//!
//! A [`SharedSegment`] is one process's attachment to an OS segment whose
//! whole payload is one 32-bit counter:
//!
//! ```text
//!   offset 0               4
//!          ┌───────────────┐
//!          │  u32 counter  │   no header, no padding, no version
//!          └───────────────┘
//! ```
//!
//! The segment outlives every attachment. Dropping a `SharedSegment` only
//! detaches it; destroying the segment is an explicit operator action
//! performed with [`remove`].
//!
//! # Platform Support
//!
//! Segments are available on Unix targets. Everywhere else each constructor
//! returns [`CounterError::UnsupportedPlatform`] instead of falling back to a
//! lock-based emulation.

use std::io;
use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};
use std::sync::atomic::AtomicU32;

use bytemuck::{Pod, Zeroable};
use tracing::{debug, warn};

use crate::error::{CounterError, Result};
use crate::key::SegmentKey;

/// In-memory layout of a counter segment, identical for every attacher.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct SegmentLayout {
    counter: u32,
}

/// Number of bytes requested from the OS for each segment.
pub const SEGMENT_SIZE: usize = size_of::<SegmentLayout>();

const _: () = assert!(SEGMENT_SIZE == 4);
const _: () = assert!(align_of::<SegmentLayout>() == align_of::<AtomicU32>());

/// Default permission bits for newly created segments (`rw-rw-rw-`).
pub const DEFAULT_MODE: u32 = 0o666;

/// How a segment came to be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// This call created the segment.
    Created,
    /// The segment already existed and was attached as is.
    Attached,
}

/// One attachment of a counter segment into this process.
pub struct SharedSegment {
    key: SegmentKey,
    shmid: i32,
    base: NonNull<SegmentLayout>,
}

// SAFETY: the mapped memory is only ever accessed through `AtomicU32`, and the
// attachment itself is plain data that any thread may detach.
unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl SharedSegment {
    /// Creates a new segment for `key`, failing with
    /// [`CounterError::AlreadyExists`] if one is already there.
    ///
    /// The new segment is zero-filled by the OS.
    pub fn create(key: SegmentKey, mode: u32) -> Result<Self> {
        ensure_supported()?;
        let flags = sys::IPC_CREAT | sys::IPC_EXCL | permissions(mode);
        let shmid = sys::get(key.raw(), SEGMENT_SIZE, flags).map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                CounterError::AlreadyExists { key }
            } else {
                CounterError::Resource {
                    op: "shmget",
                    key,
                    source,
                }
            }
        })?;

        match Self::attach(key, shmid) {
            Ok(segment) => {
                debug!(%key, shmid, "created shared counter segment");
                Ok(segment)
            }
            Err(err) => {
                discard(key, shmid);
                Err(err)
            }
        }
    }

    /// Attaches an existing segment, failing with [`CounterError::NotFound`]
    /// if there is none for `key`.
    pub fn open(key: SegmentKey) -> Result<Self> {
        ensure_supported()?;
        let shmid = sys::get(key.raw(), SEGMENT_SIZE, 0)
            .map_err(|source| lookup_error("shmget", key, source))?;
        let segment = Self::attach(key, shmid)?;
        debug!(%key, shmid, "attached shared counter segment");
        Ok(segment)
    }

    /// Creates the segment if missing, otherwise attaches the existing one.
    pub fn create_or_open(key: SegmentKey, mode: u32) -> Result<(Self, Origin)> {
        match Self::create(key, mode) {
            Ok(segment) => Ok((segment, Origin::Created)),
            Err(CounterError::AlreadyExists { .. }) => {
                Self::open(key).map(|segment| (segment, Origin::Attached))
            }
            Err(err) => Err(err),
        }
    }

    fn attach(key: SegmentKey, shmid: i32) -> Result<Self> {
        let addr = sys::attach(shmid).map_err(|source| CounterError::Resource {
            op: "shmat",
            key,
            source,
        })?;
        debug_assert_eq!(addr.as_ptr() as usize % align_of::<AtomicU32>(), 0);
        Ok(SharedSegment {
            key,
            shmid,
            base: addr.cast(),
        })
    }

    /// Returns the key this segment was resolved from.
    #[inline]
    pub fn key(&self) -> SegmentKey {
        self.key
    }

    /// Returns the OS identifier of the segment.
    #[inline]
    pub fn shmid(&self) -> i32 {
        self.shmid
    }

    /// Returns the counter word as an atomic.
    #[inline]
    pub fn cell(&self) -> &AtomicU32 {
        // SAFETY: `base` points to a live, page-aligned mapping of at least
        // SEGMENT_SIZE bytes until `self` is dropped, and every process only
        // touches the word through atomic operations.
        unsafe { AtomicU32::from_ptr(ptr::addr_of_mut!((*self.base.as_ptr()).counter)) }
    }

    /// Returns how many attachments the segment currently has, across all
    /// processes.
    pub fn attach_count(&self) -> Result<usize> {
        sys::attach_count(self.shmid).map_err(|source| CounterError::Resource {
            op: "shmctl",
            key: self.key,
            source,
        })
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        match sys::detach(self.base.cast()) {
            Ok(()) => debug!(key = %self.key, shmid = self.shmid, "detached shared counter segment"),
            Err(err) => warn!(key = %self.key, shmid = self.shmid, error = %err, "shmdt failed"),
        }
    }
}

impl std::fmt::Debug for SharedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSegment")
            .field("key", &self.key)
            .field("shmid", &self.shmid)
            .finish()
    }
}

/// Marks the segment for `key` for destruction.
///
/// The OS destroys it once the last attachment goes away; processes that are
/// still attached keep working on the old memory, while the key becomes free
/// for a new segment immediately. Fails with [`CounterError::NotFound`] if
/// there is no segment for `key`.
pub fn remove(key: SegmentKey) -> Result<()> {
    ensure_supported()?;
    let shmid = sys::get(key.raw(), 0, 0).map_err(|source| lookup_error("shmget", key, source))?;
    sys::remove(shmid).map_err(|source| CounterError::Resource {
        op: "shmctl",
        key,
        source,
    })?;
    debug!(%key, shmid, "removed shared counter segment");
    Ok(())
}

/// Marks a segment we created but could not map for removal.
fn discard(key: SegmentKey, shmid: i32) {
    match sys::remove(shmid) {
        Ok(()) => debug!(%key, shmid, "removed unmappable segment"),
        Err(err) => warn!(%key, shmid, error = %err, "shmctl(IPC_RMID) failed after shmat failure"),
    }
}

fn lookup_error(op: &'static str, key: SegmentKey, source: io::Error) -> CounterError {
    if source.kind() == io::ErrorKind::NotFound {
        CounterError::NotFound { key }
    } else {
        CounterError::Resource { op, key, source }
    }
}

#[inline]
fn permissions(mode: u32) -> i32 {
    (mode & 0o777) as i32
}

#[cfg(unix)]
fn ensure_supported() -> Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn ensure_supported() -> Result<()> {
    Err(CounterError::UnsupportedPlatform(
        "System V shared memory is only available on Unix",
    ))
}

#[cfg(unix)]
mod sys {
    use std::io;
    use std::ptr::{self, NonNull};

    pub(super) const IPC_CREAT: i32 = libc::IPC_CREAT;
    pub(super) const IPC_EXCL: i32 = libc::IPC_EXCL;

    fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    pub(super) fn get(key: i32, size: usize, flags: i32) -> io::Result<i32> {
        // SAFETY: shmget has no memory-safety preconditions.
        check(unsafe { libc::shmget(key as libc::key_t, size, flags) })
    }

    pub(super) fn attach(shmid: i32) -> io::Result<NonNull<u8>> {
        // SAFETY: a null address lets the kernel pick a suitably aligned spot.
        let addr = unsafe { libc::shmat(shmid, ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("shmat returned a null address"))
    }

    pub(super) fn detach(addr: NonNull<u8>) -> io::Result<()> {
        // SAFETY: `addr` was returned by shmat and is detached exactly once.
        check(unsafe { libc::shmdt(addr.as_ptr().cast_const().cast()) }).map(drop)
    }

    pub(super) fn attach_count(shmid: i32) -> io::Result<usize> {
        // SAFETY: shmid_ds is plain old data; IPC_STAT fills it in.
        let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
        check(unsafe { libc::shmctl(shmid, libc::IPC_STAT, &mut ds) })?;
        Ok(ds.shm_nattch as usize)
    }

    pub(super) fn remove(shmid: i32) -> io::Result<()> {
        // SAFETY: IPC_RMID ignores the buffer argument.
        check(unsafe { libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut()) }).map(drop)
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io;
    use std::ptr::NonNull;

    pub(super) const IPC_CREAT: i32 = 0;
    pub(super) const IPC_EXCL: i32 = 0;

    fn unsupported<T>() -> io::Result<T> {
        Err(io::ErrorKind::Unsupported.into())
    }

    pub(super) fn get(_key: i32, _size: usize, _flags: i32) -> io::Result<i32> {
        unsupported()
    }

    pub(super) fn attach(_shmid: i32) -> io::Result<NonNull<u8>> {
        unsupported()
    }

    pub(super) fn detach(_addr: NonNull<u8>) -> io::Result<()> {
        unsupported()
    }

    pub(super) fn attach_count(_shmid: i32) -> io::Result<usize> {
        unsupported()
    }

    pub(super) fn remove(_shmid: i32) -> io::Result<()> {
        unsupported()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{undersized_segment, unique_key, SegmentGuard};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_layout() {
        assert_eq!(SEGMENT_SIZE, 4);
        let zero: SegmentLayout = Zeroable::zeroed();
        assert_eq!(bytemuck::bytes_of(&zero), &[0u8; 4]);
    }

    #[test]
    fn test_create_is_zero_filled() {
        let guard = SegmentGuard::new(unique_key());
        let segment = SharedSegment::create(guard.key(), DEFAULT_MODE).unwrap();
        assert_eq!(segment.cell().load(Ordering::SeqCst), 0);
        assert_eq!(segment.key(), guard.key());
    }

    #[test]
    fn test_create_twice_fails() {
        let guard = SegmentGuard::new(unique_key());
        let _first = SharedSegment::create(guard.key(), DEFAULT_MODE).unwrap();
        let second = SharedSegment::create(guard.key(), DEFAULT_MODE);
        assert!(matches!(second, Err(CounterError::AlreadyExists { .. })));
    }

    #[test]
    fn test_open_missing() {
        let key = unique_key();
        assert!(matches!(
            SharedSegment::open(key),
            Err(CounterError::NotFound { .. })
        ));
    }

    #[test]
    fn test_create_or_open_origin() {
        let guard = SegmentGuard::new(unique_key());
        let (a, origin_a) = SharedSegment::create_or_open(guard.key(), DEFAULT_MODE).unwrap();
        let (b, origin_b) = SharedSegment::create_or_open(guard.key(), DEFAULT_MODE).unwrap();
        assert_eq!(origin_a, Origin::Created);
        assert_eq!(origin_b, Origin::Attached);
        assert_eq!(a.shmid(), b.shmid());

        a.cell().store(7, Ordering::SeqCst);
        assert_eq!(b.cell().load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_attach_count_tracks_attachments() {
        let guard = SegmentGuard::new(unique_key());
        let a = SharedSegment::create(guard.key(), DEFAULT_MODE).unwrap();
        assert_eq!(a.attach_count().unwrap(), 1);
        let b = SharedSegment::open(guard.key()).unwrap();
        assert_eq!(a.attach_count().unwrap(), 2);
        drop(b);
        assert_eq!(a.attach_count().unwrap(), 1);
    }

    #[test]
    fn test_remove_frees_key() {
        let key = unique_key();
        let old = SharedSegment::create(key, DEFAULT_MODE).unwrap();
        old.cell().store(99, Ordering::SeqCst);
        remove(key).unwrap();

        // Still attached, still usable.
        assert_eq!(old.cell().load(Ordering::SeqCst), 99);

        let guard = SegmentGuard::new(key);
        let fresh = SharedSegment::create(guard.key(), DEFAULT_MODE).unwrap();
        assert_eq!(fresh.cell().load(Ordering::SeqCst), 0);
        assert_ne!(fresh.shmid(), old.shmid());
    }

    #[test]
    fn test_remove_missing() {
        assert!(matches!(
            remove(unique_key()),
            Err(CounterError::NotFound { .. })
        ));
    }

    #[test]
    fn test_discard_removes_unmapped_segment() {
        let key = unique_key();
        let _guard = SegmentGuard::new(key);
        let flags = sys::IPC_CREAT | sys::IPC_EXCL | 0o600;
        let shmid = sys::get(key.raw(), SEGMENT_SIZE, flags).unwrap();

        discard(key, shmid);
        assert!(matches!(
            SharedSegment::open(key),
            Err(CounterError::NotFound { .. })
        ));

        // A second attempt fails inside shmctl and is only logged.
        discard(key, shmid);
    }

    #[test]
    fn test_undersized_segment_is_resource_error() {
        let guard = undersized_segment(unique_key());

        let err = SharedSegment::open(guard.key()).unwrap_err();
        assert!(matches!(err, CounterError::Resource { op: "shmget", .. }));
        let err = SharedSegment::create_or_open(guard.key(), DEFAULT_MODE).unwrap_err();
        assert!(err.is_resource());
    }
}
