//! Configuration for attaching shared counters.
//!
//! Processes sharing a counter have to agree on its key out of band. A
//! [`CounterConfig`] carries that key together with the initial value and the
//! permission bits used if the segment has to be created. It can be built in
//! code, read from the environment, or (with the `serde` feature)
//! deserialized from any serde format.
//!
//! # Environment
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `SHMCOUNTER_KEY` | segment key, hex (`0x...`) or decimal | required |
//! | `SHMCOUNTER_INITIAL` | initial value if the segment is created | `0` |
//! | `SHMCOUNTER_MODE` | octal permission bits for a new segment | `666` |
//! | `SHMCOUNTER_NAME` | display name of the handle | empty |

use crate::error::{CounterError, Result};
use crate::key::SegmentKey;
use crate::segment::DEFAULT_MODE;

/// Environment variable holding the segment key.
pub const ENV_KEY: &str = "SHMCOUNTER_KEY";
/// Environment variable holding the initial value.
pub const ENV_INITIAL: &str = "SHMCOUNTER_INITIAL";
/// Environment variable holding the octal permission bits.
pub const ENV_MODE: &str = "SHMCOUNTER_MODE";
/// Environment variable holding the handle name.
pub const ENV_NAME: &str = "SHMCOUNTER_NAME";

/// Everything needed to create or attach one shared counter.
///
/// # Examples
///
/// ```rust
/// use shmcounter::{CounterConfig, SegmentKey};
///
/// let config = CounterConfig::new(SegmentKey::new(0x00ac_00ac).unwrap())
///     .with_initial_value(100)
///     .with_mode(0o600)
///     .with_name("tokens");
///
/// assert_eq!(config.initial_value, 100);
/// assert_eq!(config.mode, 0o600);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CounterConfig {
    /// Key of the segment.
    pub key: SegmentKey,
    /// Value stored if this process ends up creating the segment.
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial_value: u32,
    /// Permission bits for a newly created segment.
    #[cfg_attr(feature = "serde", serde(default = "default_mode"))]
    pub mode: u32,
    /// Display name for the handle.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
}

#[cfg(feature = "serde")]
fn default_mode() -> u32 {
    DEFAULT_MODE
}

impl CounterConfig {
    /// Creates a configuration for `key` with every other field defaulted.
    pub fn new(key: SegmentKey) -> Self {
        CounterConfig {
            key,
            initial_value: 0,
            mode: DEFAULT_MODE,
            name: String::new(),
        }
    }

    /// Sets the initial value.
    pub fn with_initial_value(mut self, value: u32) -> Self {
        self.initial_value = value;
        self
    }

    /// Sets the permission bits. Only the low nine bits are used.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & 0o777;
        self
    }

    /// Sets the handle name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let key = lookup(ENV_KEY)
            .ok_or_else(|| CounterError::InvalidKey(format!("{ENV_KEY} is not set")))?
            .parse()?;
        let mut config = CounterConfig::new(key);

        if let Some(initial) = lookup(ENV_INITIAL) {
            config.initial_value = initial
                .trim()
                .parse()
                .map_err(|e| CounterError::Config(format!("{ENV_INITIAL}={initial:?}: {e}")))?;
        }
        if let Some(mode) = lookup(ENV_MODE) {
            config.mode = parse_mode(&mode)
                .ok_or_else(|| CounterError::Config(format!("{ENV_MODE}={mode:?}: not an octal mode")))?;
        }
        if let Some(name) = lookup(ENV_NAME) {
            config.name = name;
        }
        Ok(config)
    }
}

fn parse_mode(s: &str) -> Option<u32> {
    let s = s.trim();
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).ok().filter(|m| *m <= 0o777)
}
