//! The shared counter handle.
//!
//! [`SharedCounter`] binds one process's attachment of a counter segment to
//! the atomic operations on it. Every operation is a single sequentially
//! consistent atomic instruction on the shared word: it never blocks, never
//! retries and never logs.
//!
//! ```text
//!   process P                         process Q
//!   ┌──────────────┐                  ┌──────────────┐
//!   │ SharedCounter│                  │ SharedCounter│
//!   │  (attached)  │                  │  (attached)  │
//!   └──────┬───────┘                  └──────┬───────┘
//!          │      fetch_add / load / store   │
//!          └──────────────►┌─────┐◄──────────┘
//!                          │ u32 │  segment for key K
//!                          └─────┘
//! ```
//!
//! A handle is either *bound* to a segment or *unbound*. Handles start
//! unbound when created with [`SharedCounter::unbound`] (or `Default`), and
//! become unbound again after [`SharedCounter::release`]. Every operation on
//! an unbound handle fails with [`CounterError::InvalidHandle`].

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::CounterConfig;
use crate::error::{CounterError, Result};
use crate::key::SegmentKey;
use crate::segment::{Origin, SharedSegment, DEFAULT_MODE};

/// A 32-bit counter living in shared memory, visible to every process that
/// attaches the same [`SegmentKey`].
///
/// # Initial Value
///
/// [`init`](Self::init) is create-or-attach: the first caller creates the
/// segment and adds `initial` to its zero fill, every later caller attaches
/// and leaves the value alone. Updates made by processes that attach while
/// the creator is still initializing are kept on top of `initial`. Use
/// [`created`](Self::created) to learn which one happened, or
/// [`create_exclusive`](Self::create_exclusive) when a caller must be the
/// initializer.
///
/// # Wraparound
///
/// All arithmetic wraps modulo 2^32: `inc` on `u32::MAX` yields `0` and `dec`
/// on `0` yields `u32::MAX`.
///
/// # Examples
///
/// ```rust,no_run
/// use shmcounter::{SegmentKey, SharedCounter};
///
/// let key: SegmentKey = "0xac00ac".parse()?;
/// let counter = SharedCounter::init(key, 0)?.with_name("workers");
///
/// if counter.created() {
///     println!("initialized {key}");
/// }
/// counter.inc()?;
/// counter.add(5)?;
/// println!("{counter}");
/// # Ok::<(), shmcounter::CounterError>(())
/// ```
pub struct SharedCounter {
    name: String,
    segment: Option<SharedSegment>,
    created: bool,
}

impl SharedCounter {
    /// Creates a handle that is not attached to anything.
    ///
    /// Every operation on it fails with [`CounterError::InvalidHandle`] until
    /// [`attach`](Self::attach) succeeds.
    pub const fn unbound() -> Self {
        SharedCounter {
            name: String::new(),
            segment: None,
            created: false,
        }
    }

    /// Creates the counter for `key` with value `initial`, or attaches to it
    /// if it already exists, leaving its value untouched.
    pub fn init(key: SegmentKey, initial: u32) -> Result<Self> {
        Self::init_with_mode(key, initial, DEFAULT_MODE)
    }

    /// Like [`init`](Self::init), with explicit permission bits for the
    /// segment if this call creates it.
    pub fn init_with_mode(key: SegmentKey, initial: u32, mode: u32) -> Result<Self> {
        let (segment, origin) = SharedSegment::create_or_open(key, mode)?;
        Ok(Self::bind(segment, origin, initial))
    }

    /// Creates the counter for `key` with value `initial`, failing with
    /// [`CounterError::AlreadyExists`] if it already exists.
    ///
    /// This is the way for a single designated initializer to guarantee the
    /// starting value.
    pub fn create_exclusive(key: SegmentKey, initial: u32) -> Result<Self> {
        let segment = SharedSegment::create(key, DEFAULT_MODE)?;
        Ok(Self::bind(segment, Origin::Created, initial))
    }

    /// Attaches to an existing counter, failing with
    /// [`CounterError::NotFound`] if there is none for `key`.
    pub fn open_existing(key: SegmentKey) -> Result<Self> {
        let segment = SharedSegment::open(key)?;
        Ok(Self::bind(segment, Origin::Attached, 0))
    }

    /// Create-or-attach driven by a [`CounterConfig`].
    pub fn from_config(config: &CounterConfig) -> Result<Self> {
        Ok(Self::init_with_mode(config.key, config.initial_value, config.mode)?
            .with_name(config.name.clone()))
    }

    /// Rebinds this handle to the counter for `key`, with [`init`](Self::init)
    /// semantics.
    ///
    /// Any previous attachment is released first. If attaching fails the
    /// handle is left unbound.
    pub fn attach(&mut self, key: SegmentKey, initial: u32) -> Result<()> {
        self.release();
        let (segment, origin) = SharedSegment::create_or_open(key, DEFAULT_MODE)?;
        let bound = Self::bind(segment, origin, initial);
        self.segment = bound.segment;
        self.created = bound.created;
        Ok(())
    }

    fn bind(segment: SharedSegment, origin: Origin, initial: u32) -> Self {
        let created = origin == Origin::Created;
        if created {
            // Others may attach and update between shmget and here; adding to
            // the OS zero-fill keeps their deltas.
            segment.cell().fetch_add(initial, Ordering::SeqCst);
        }
        SharedCounter {
            name: String::new(),
            segment: Some(segment),
            created,
        }
    }

    /// Sets the name of this counter, returning `self` for method chaining.
    ///
    /// The name is local to this handle and only used for display and
    /// snapshots; it is not stored in shared memory.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Returns the name of this handle, or an empty string.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key of the attached segment, if bound.
    #[inline]
    pub fn key(&self) -> Option<SegmentKey> {
        self.segment.as_ref().map(SharedSegment::key)
    }

    /// Returns `true` while the handle is attached.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.segment.is_some()
    }

    /// Returns `true` if this handle created the segment and therefore
    /// applied its initial value.
    #[inline]
    pub fn created(&self) -> bool {
        self.created
    }

    #[inline]
    fn cell(&self) -> Result<&AtomicU32> {
        self.segment
            .as_ref()
            .map(SharedSegment::cell)
            .ok_or(CounterError::InvalidHandle)
    }

    /// Increments by one and returns the new value.
    #[inline]
    pub fn inc(&self) -> Result<u32> {
        self.add(1)
    }

    /// Decrements by one and returns the new value.
    #[inline]
    pub fn dec(&self) -> Result<u32> {
        self.sub(1)
    }

    /// Reads the current value.
    #[inline]
    pub fn get(&self) -> Result<u32> {
        Ok(self.cell()?.load(Ordering::SeqCst))
    }

    /// Stores `value`, discarding concurrent history, and returns it.
    #[inline]
    pub fn set(&self, value: u32) -> Result<u32> {
        self.cell()?.store(value, Ordering::SeqCst);
        Ok(value)
    }

    /// Adds `value` and returns the new value.
    ///
    /// # Examples
    ///
    /// Subtraction through wraparound:
    ///
    /// ```rust,no_run
    /// # use shmcounter::{SegmentKey, SharedCounter};
    /// # let counter = SharedCounter::init(SegmentKey::new(0x5eed)?, 0)?;
    /// counter.set(10)?;
    /// assert_eq!(counter.add(3u32.wrapping_neg())?, 7);
    /// # Ok::<(), shmcounter::CounterError>(())
    /// ```
    #[inline]
    pub fn add(&self, value: u32) -> Result<u32> {
        Ok(self
            .cell()?
            .fetch_add(value, Ordering::SeqCst)
            .wrapping_add(value))
    }

    /// Subtracts `value` and returns the new value.
    #[inline]
    pub fn sub(&self, value: u32) -> Result<u32> {
        Ok(self
            .cell()?
            .fetch_sub(value, Ordering::SeqCst)
            .wrapping_sub(value))
    }

    /// Returns the current value and resets the counter to zero atomically.
    ///
    /// Useful for periodic collection, where each reader wants the count
    /// accumulated since the previous collection.
    #[inline]
    pub fn value_and_reset(&self) -> Result<u32> {
        Ok(self.cell()?.swap(0, Ordering::SeqCst))
    }

    /// Returns how many attachments the segment has across all processes.
    pub fn attach_count(&self) -> Result<usize> {
        self.segment
            .as_ref()
            .ok_or(CounterError::InvalidHandle)?
            .attach_count()
    }

    /// Detaches from the segment. The segment itself is left in place.
    ///
    /// Releasing an unbound handle does nothing.
    pub fn release(&mut self) {
        self.segment = None;
        self.created = false;
    }
}

impl Default for SharedCounter {
    /// Creates an unbound handle with no name.
    fn default() -> Self {
        Self::unbound()
    }
}

impl Debug for SharedCounter {
    /// Output format: `name{key=0x... value=...}` or `name{unbound}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.name)?;
        match (self.key(), self.get()) {
            (Some(key), Ok(value)) => write!(f, "key={key} value={value}")?,
            _ => write!(f, "unbound")?,
        }
        write!(f, "}}")
    }
}

impl Display for SharedCounter {
    /// Formats the counter as `name:value` if named, or just `value`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.name.is_empty() {
            write!(f, "{}:", self.name)?;
        }
        match self.get() {
            Ok(value) => write!(f, "{value}"),
            Err(_) => write!(f, "<unbound>"),
        }
    }
}
