//! JSON observer for serializing shared counters.
//!
//! This module provides [`JsonObserver`], which serializes a collection of
//! [`SharedCounter`]s to JSON using serde.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! shmcounter = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use shmcounter::SharedCounter;
//! use shmcounter::observers::json::JsonObserver;
//!
//! let requests = SharedCounter::init(requests_key, 0)?.with_name("http_requests");
//! let errors = SharedCounter::init(errors_key, 0)?.with_name("http_errors");
//!
//! requests.add(1000)?;
//! errors.add(5)?;
//!
//! let json = JsonObserver::new().to_json([&requests, &errors])?;
//! // [{"name":"http_requests","key":"0x...","value":1000},{"name":"http_errors",...}]
//! ```

use crate::counter::SharedCounter;
use crate::error::Result;
use crate::snapshot::{CounterSnapshot, MetricsSnapshot};

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to include a timestamp in the output.
    pub include_timestamp: bool,
    /// Whether to wrap counters in a [`MetricsSnapshot`] object.
    pub wrap_in_snapshot: bool,
}

/// An observer that serializes shared counters to JSON.
///
/// ```rust,ignore
/// use shmcounter::observers::json::JsonObserver;
///
/// let observer = JsonObserver::new()
///     .pretty(true)
///     .wrap_in_snapshot(true)
///     .include_timestamp(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables timestamp inclusion.
    ///
    /// Only has effect when `wrap_in_snapshot` is also enabled.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Enables or disables wrapping the output in a [`MetricsSnapshot`].
    pub fn wrap_in_snapshot(mut self, enabled: bool) -> Self {
        self.config.wrap_in_snapshot = enabled;
        self
    }

    /// Reads counters into a vector of [`CounterSnapshot`].
    pub fn collect<'a>(
        &self,
        counters: impl IntoIterator<Item = &'a SharedCounter>,
    ) -> Result<Vec<CounterSnapshot>> {
        MetricsSnapshot::collect(counters).map(|s| s.counters)
    }

    /// Reads counters and resets each of them atomically.
    pub fn collect_and_reset<'a>(
        &self,
        counters: impl IntoIterator<Item = &'a SharedCounter>,
    ) -> Result<Vec<CounterSnapshot>> {
        MetricsSnapshot::collect_and_reset(counters).map(|s| s.counters)
    }

    /// Serializes counters to a JSON string.
    pub fn to_json<'a>(
        &self,
        counters: impl IntoIterator<Item = &'a SharedCounter>,
    ) -> Result<String> {
        let snapshots = self.collect(counters)?;
        self.render(snapshots)
    }

    /// Serializes counters to JSON and resets them.
    ///
    /// Each counter's read-and-reset is atomic; the set as a whole is not.
    pub fn to_json_and_reset<'a>(
        &self,
        counters: impl IntoIterator<Item = &'a SharedCounter>,
    ) -> Result<String> {
        let snapshots = self.collect_and_reset(counters)?;
        self.render(snapshots)
    }

    /// Serializes counters to a JSON byte vector.
    pub fn to_json_bytes<'a>(
        &self,
        counters: impl IntoIterator<Item = &'a SharedCounter>,
    ) -> Result<Vec<u8>> {
        let snapshots = self.collect(counters)?;
        let bytes = if self.config.wrap_in_snapshot {
            serde_json::to_vec(&self.wrap(snapshots))?
        } else {
            serde_json::to_vec(&snapshots)?
        };
        Ok(bytes)
    }

    fn wrap(&self, snapshots: Vec<CounterSnapshot>) -> MetricsSnapshot {
        if self.config.include_timestamp {
            MetricsSnapshot::with_timestamp(snapshots, current_timestamp_ms())
        } else {
            MetricsSnapshot::new(snapshots)
        }
    }

    fn render(&self, snapshots: Vec<CounterSnapshot>) -> Result<String> {
        let json = if self.config.wrap_in_snapshot {
            let snapshot = self.wrap(snapshots);
            if self.config.pretty {
                serde_json::to_string_pretty(&snapshot)?
            } else {
                serde_json::to_string(&snapshot)?
            }
        } else if self.config.pretty {
            serde_json::to_string_pretty(&snapshots)?
        } else {
            serde_json::to_string(&snapshots)?
        };
        Ok(json)
    }
}

/// Returns the current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
