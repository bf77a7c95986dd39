//! Observer implementations for exporting shared counter values.
//!
//! - [`json`] - Serialize counters to JSON format
//!
//! # Feature Flags
//!
//! Each observer is gated behind a feature flag to minimize dependencies:
//!
//! - `json` - Enables the [`json`] module
//! - `full` - Enables all observer modules
//!
//! Observers report failures through the crate-wide
//! [`CounterError`](crate::CounterError), so an unbound handle in the input
//! surfaces as [`CounterError::InvalidHandle`](crate::CounterError::InvalidHandle).

#[cfg(feature = "json")]
pub mod json;
