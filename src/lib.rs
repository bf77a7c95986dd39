//! # shmcounter - Atomic Counters in Shared Memory
//!
//! A Rust library providing a 32-bit counter whose storage lives in a System V
//! shared-memory segment, so that independent processes can observe and
//! update the same value without a coordinator and without exchanging
//! messages.
//!
//! ## The Problem
//!
//! In-process atomics such as `AtomicU32` only work between threads that
//! share an address space. Reference counts across process boundaries, rate
//! limiters shared by a pool of workers, or generation numbers published to
//! unrelated programs all need a value that every process can reach.
//!
//! ## The Solution: One Word of Shared Memory
//!
//! Each counter is a segment holding exactly one `u32`. Every process that
//! knows the segment's [`SegmentKey`] attaches it and gets a
//! [`SharedCounter`] handle. All operations on the handle are single atomic
//! instructions on that word:
//!
//! | Operation | Instruction | Returns |
//! |-----------|-------------|---------|
//! | [`inc`](SharedCounter::inc) | fetch-and-add 1 | new value |
//! | [`dec`](SharedCounter::dec) | fetch-and-sub 1 | new value |
//! | [`add`](SharedCounter::add) | fetch-and-add | new value |
//! | [`sub`](SharedCounter::sub) | fetch-and-sub | new value |
//! | [`get`](SharedCounter::get) | load | current value |
//! | [`set`](SharedCounter::set) | store | stored value |
//! | [`value_and_reset`](SharedCounter::value_and_reset) | swap with 0 | previous value |
//!
//! ### Design Principles
//!
//! 1. **Lock-free**: no operation blocks, retries, or times out. Platforms
//!    that cannot do this are rejected instead of emulated with locks.
//!
//! 2. **Sequential consistency on the counter word**: all operations use
//!    `Ordering::SeqCst`, so all updates from all processes fall into one
//!    total order. Nothing is promised about any other memory.
//!
//! 3. **Wraparound is defined**: arithmetic is modulo 2^32, never an error.
//!
//! 4. **Handles don't own segments**: dropping or releasing a handle only
//!    detaches it. Removing a segment is an explicit call to
//!    [`segment::remove`], made by whoever owns the key.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shmcounter::{SegmentKey, SharedCounter};
//!
//! // Every process uses the same key, agreed on out of band.
//! let key: SegmentKey = "0xac00ac".parse()?;
//!
//! // The first process to get here creates the counter at 0; everybody
//! // else attaches to it and the value is left alone.
//! let counter = SharedCounter::init(key, 0)?.with_name("requests");
//!
//! counter.inc()?;
//! counter.add(5)?;
//! println!("{counter}");
//! # Ok::<(), shmcounter::CounterError>(())
//! ```
//!
//! ## Choosing the Initial Value
//!
//! [`SharedCounter::init`] is idempotent with respect to creation: only the
//! first call applies its initial value. When the value must be guaranteed,
//! run a single initializer with [`SharedCounter::create_exclusive`] before
//! the other processes start, or have it call [`SharedCounter::set`].
//!
//! ## Configuration
//!
//! [`CounterConfig`] carries the key, initial value, and permission bits,
//! and can be read from `SHMCOUNTER_*` environment variables with
//! [`CounterConfig::from_env`].
//!
//! ## Observers
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `serde` | [`snapshot`] | Serializable snapshots of counter values |
//! | `json` | [`observers::json`] | Serialize counters to JSON |
//! | `full` | All observers | Enables all observer modules |

#[cfg(not(target_has_atomic = "32"))]
compile_error!("shmcounter requires native 32-bit atomics");

pub mod config;
pub mod counter;
pub mod error;
pub mod key;
pub mod observers;
pub mod segment;

#[cfg(feature = "serde")]
pub mod snapshot;

#[cfg(all(test, unix))]
mod testing;

pub use config::CounterConfig;
pub use counter::SharedCounter;
pub use error::{CounterError, Result};
pub use key::SegmentKey;
