//! Unified error type for shared counters.
//!
//! Every fallible operation in this crate returns [`CounterError`], whether it
//! failed while resolving a key, attaching a segment, operating on a released
//! handle, or exporting values through an observer.
//!
//! # Example
//!
//! ```rust,no_run
//! use shmcounter::{CounterError, Result, SegmentKey, SharedCounter};
//!
//! fn bump(key: SegmentKey) -> Result<u32> {
//!     let counter = SharedCounter::init(key, 0)?;
//!     counter.inc()
//! }
//!
//! match bump(SegmentKey::new(0x00ac_00ac).unwrap()) {
//!     Ok(v) => println!("now {v}"),
//!     Err(e) if e.is_resource() => eprintln!("segment unavailable: {e}"),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

use crate::key::SegmentKey;
use thiserror::Error;

/// Unified error type for all counter operations.
#[derive(Debug, Error)]
pub enum CounterError {
    /// The OS refused to create, attach, inspect or remove a segment.
    ///
    /// Covers permission denied, a pre-existing segment too small for a
    /// counter, and memory or identifier exhaustion.
    #[error("cannot {op} shared segment {key}: {source}")]
    Resource {
        /// The system call that failed (`shmget`, `shmat`, ...).
        op: &'static str,
        /// Key of the segment.
        key: SegmentKey,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// An exclusive create found a segment already present.
    #[error("shared segment {key} already exists")]
    AlreadyExists {
        /// Key of the segment.
        key: SegmentKey,
    },

    /// An attach-only open found no segment for the key.
    #[error("no shared segment for key {key}")]
    NotFound {
        /// Key of the segment.
        key: SegmentKey,
    },

    /// Operation on a handle that was never bound or was already released.
    #[error("counter handle is not attached")]
    InvalidHandle,

    /// The host cannot provide lock-free 32-bit atomics over shared memory.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(&'static str),

    /// A key could not be parsed or derived.
    #[error("invalid segment key: {0}")]
    InvalidKey(String),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Error from the JSON observer.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CounterError {
    /// Returns `true` for failures of the OS shared-memory facility.
    ///
    /// This groups [`Resource`](Self::Resource) with the more specific
    /// [`AlreadyExists`](Self::AlreadyExists) and [`NotFound`](Self::NotFound).
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            CounterError::Resource { .. }
                | CounterError::AlreadyExists { .. }
                | CounterError::NotFound { .. }
        )
    }

    pub(crate) fn last_os(op: &'static str, key: SegmentKey) -> Self {
        CounterError::Resource {
            op,
            key,
            source: std::io::Error::last_os_error(),
        }
    }
}

/// Result type for counter operations.
pub type Result<T> = std::result::Result<T, CounterError>;
