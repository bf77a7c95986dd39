//! Helpers for tests that need real segments.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::CounterError;
use crate::key::SegmentKey;
use crate::segment::{self, SharedSegment};

static NEXT: AtomicU32 = AtomicU32::new(0);

/// Returns a key no other test in any running process uses.
///
/// The key embeds the whole pid (Linux caps it at 22 bits), so two live
/// processes never share one. A key still holding a segment from an earlier
/// process that had the same pid is skipped rather than removed.
pub(crate) fn unique_key() -> SegmentKey {
    let pid = std::process::id() & 0x3f_ffff;
    loop {
        let seq = NEXT.fetch_add(1, Ordering::Relaxed);
        assert!(seq <= 0xff, "ran out of test keys for this process");
        let raw = 0x4000_0000 | (pid << 8) | seq;
        let key = SegmentKey::new(raw as i32).expect("non-zero key");
        if matches!(SharedSegment::open(key), Err(CounterError::NotFound { .. })) {
            return key;
        }
    }
}

/// Removes the segment for its key when dropped.
pub(crate) struct SegmentGuard(SegmentKey);

impl SegmentGuard {
    pub(crate) fn new(key: SegmentKey) -> Self {
        SegmentGuard(key)
    }

    pub(crate) fn key(&self) -> SegmentKey {
        self.0
    }
}

impl Drop for SegmentGuard {
    fn drop(&mut self) {
        let _ = segment::remove(self.0);
    }
}

/// Creates a segment too small to hold a counter.
pub(crate) fn undersized_segment(key: SegmentKey) -> SegmentGuard {
    // SAFETY: plain syscall creating a 1-byte segment under a test key.
    let id = unsafe { libc::shmget(key.raw(), 1, libc::IPC_CREAT | libc::IPC_EXCL | 0o600) };
    assert!(id >= 0, "shmget: {}", std::io::Error::last_os_error());
    SegmentGuard::new(key)
}
