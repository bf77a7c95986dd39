//! Snapshot types for serializing counter state.
//!
//! This module provides serializable snapshot types that capture the value of
//! one or more [`SharedCounter`]s at a point in time.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature:
//!
//! ```toml
//! [dependencies]
//! shmcounter = { version = "0.1", features = ["serde"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use shmcounter::SharedCounter;
//! use shmcounter::snapshot::CounterSnapshot;
//!
//! let counter = SharedCounter::init(key, 0)?.with_name("requests");
//! counter.add(42)?;
//!
//! let snapshot = CounterSnapshot::from_counter(&counter)?;
//! let json = serde_json::to_string(&snapshot)?;
//! ```

use crate::counter::SharedCounter;
use crate::error::{CounterError, Result};
use crate::key::SegmentKey;
use serde::{Deserialize, Serialize};

/// A snapshot of a single shared counter.
///
/// ```rust
/// use shmcounter::SegmentKey;
/// use shmcounter::snapshot::CounterSnapshot;
///
/// let snapshot = CounterSnapshot::new("requests", SegmentKey::new(0xac).unwrap(), 42);
/// let json = serde_json::to_string(&snapshot).unwrap();
/// assert_eq!(json, r#"{"name":"requests","key":"0x000000ac","value":42}"#);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CounterSnapshot {
    /// The name of the handle, or the key if the handle is unnamed.
    pub name: String,
    /// Key of the segment the value was read from.
    pub key: SegmentKey,
    /// The value of the counter.
    pub value: u32,
}

impl CounterSnapshot {
    /// Creates a new counter snapshot.
    pub fn new(name: impl Into<String>, key: SegmentKey, value: u32) -> Self {
        Self {
            name: name.into(),
            key,
            value,
        }
    }

    /// Reads `counter` into a snapshot.
    pub fn from_counter(counter: &SharedCounter) -> Result<Self> {
        Self::capture(counter, counter.get()?)
    }

    /// Reads `counter` into a snapshot and resets it atomically.
    pub fn from_counter_and_reset(counter: &SharedCounter) -> Result<Self> {
        Self::capture(counter, counter.value_and_reset()?)
    }

    fn capture(counter: &SharedCounter, value: u32) -> Result<Self> {
        let key = counter.key().ok_or(CounterError::InvalidHandle)?;
        let name = if counter.name().is_empty() {
            key.to_string()
        } else {
            counter.name().to_string()
        };
        Ok(Self { name, key, value })
    }
}

/// A collection of counter snapshots taken together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Optional timestamp in milliseconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// The counter snapshots.
    pub counters: Vec<CounterSnapshot>,
}

impl MetricsSnapshot {
    /// Creates a new metrics snapshot with the given counters.
    pub fn new(counters: Vec<CounterSnapshot>) -> Self {
        Self {
            timestamp_ms: None,
            counters,
        }
    }

    /// Creates a new metrics snapshot with counters and a timestamp.
    pub fn with_timestamp(counters: Vec<CounterSnapshot>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            counters,
        }
    }

    /// Finds a counter by name.
    pub fn get(&self, name: &str) -> Option<&CounterSnapshot> {
        self.counters.iter().find(|c| c.name == name)
    }

    /// Collects snapshots from a set of counters.
    ///
    /// Fails on the first unbound handle.
    pub fn collect<'a>(counters: impl IntoIterator<Item = &'a SharedCounter>) -> Result<Self> {
        counters
            .into_iter()
            .map(CounterSnapshot::from_counter)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Collects snapshots from a set of counters and resets them.
    pub fn collect_and_reset<'a>(
        counters: impl IntoIterator<Item = &'a SharedCounter>,
    ) -> Result<Self> {
        counters
            .into_iter()
            .map(CounterSnapshot::from_counter_and_reset)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: i32) -> SegmentKey {
        SegmentKey::new(raw).unwrap()
    }

    #[test]
    fn test_counter_snapshot_new() {
        let snapshot = CounterSnapshot::new("test", key(5), 42);
        assert_eq!(snapshot.name, "test");
        assert_eq!(snapshot.key, key(5));
        assert_eq!(snapshot.value, 42);
    }

    #[test]
    fn test_unbound_counter_has_no_snapshot() {
        let counter = SharedCounter::unbound();
        assert!(matches!(
            CounterSnapshot::from_counter(&counter),
            Err(CounterError::InvalidHandle)
        ));
        assert!(MetricsSnapshot::collect([&counter]).is_err());
    }

    #[test]
    fn test_metrics_snapshot_get() {
        let snapshot = MetricsSnapshot::new(vec![
            CounterSnapshot::new("foo", key(1), 1),
            CounterSnapshot::new("bar", key(2), 2),
        ]);

        assert_eq!(snapshot.get("foo").unwrap().value, 1);
        assert_eq!(snapshot.get("bar").unwrap().value, 2);
        assert!(snapshot.get("baz").is_none());
        assert!(snapshot.timestamp_ms.is_none());
    }

    #[test]
    fn test_serialize_metrics_snapshot() {
        let snapshot =
            MetricsSnapshot::with_timestamp(vec![CounterSnapshot::new("a", key(1), 1)], 1234567890);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(
            json,
            r#"{"timestamp_ms":1234567890,"counters":[{"name":"a","key":"0x00000001","value":1}]}"#
        );
    }

    #[test]
    fn test_deserialize_metrics_snapshot() {
        let json = r#"{"counters":[{"name":"a","key":"0x10","value":7}]}"#;
        let snapshot: MetricsSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.timestamp_ms, None);
        assert_eq!(snapshot.counters[0].key, key(16));
        assert_eq!(snapshot.counters[0].value, 7);
    }

    #[cfg(unix)]
    mod shared {
        use super::*;
        use crate::testing::{unique_key, SegmentGuard};

        #[test]
        fn test_from_counter() {
            let guard = SegmentGuard::new(unique_key());
            let counter = SharedCounter::init(guard.key(), 100)
                .unwrap()
                .with_name("requests");

            let snapshot = CounterSnapshot::from_counter(&counter).unwrap();
            assert_eq!(snapshot.name, "requests");
            assert_eq!(snapshot.key, guard.key());
            assert_eq!(snapshot.value, 100);
        }

        #[test]
        fn test_from_counter_unnamed_uses_key() {
            let guard = SegmentGuard::new(unique_key());
            let counter = SharedCounter::init(guard.key(), 1).unwrap();
            let snapshot = CounterSnapshot::from_counter(&counter).unwrap();
            assert_eq!(snapshot.name, guard.key().to_string());
        }

        #[test]
        fn test_collect_and_reset() {
            let a = SegmentGuard::new(unique_key());
            let b = SegmentGuard::new(unique_key());
            let c1 = SharedCounter::init(a.key(), 10).unwrap().with_name("c1");
            let c2 = SharedCounter::init(b.key(), 20).unwrap().with_name("c2");

            let snapshot = MetricsSnapshot::collect_and_reset([&c1, &c2]).unwrap();
            assert_eq!(snapshot.get("c1").unwrap().value, 10);
            assert_eq!(snapshot.get("c2").unwrap().value, 20);
            assert_eq!(c1.get().unwrap(), 0);
            assert_eq!(c2.get().unwrap(), 0);

            let snapshot = MetricsSnapshot::collect([&c1, &c2]).unwrap();
            assert_eq!(snapshot.counters.len(), 2);
        }
    }
}
