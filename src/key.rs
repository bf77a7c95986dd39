//! Keys naming shared counter segments.
//!
//! Processes sharing a counter must agree on its [`SegmentKey`] out of band,
//! usually through configuration. A key can be given as a raw integer, parsed
//! from text (`0x`-prefixed hexadecimal or decimal) or derived from an
//! existing filesystem path with [`SegmentKey::from_path`].
//!
//! ```rust
//! use shmcounter::SegmentKey;
//!
//! let a: SegmentKey = "0xac00ac".parse().unwrap();
//! let b = SegmentKey::new(0x00ac_00ac).unwrap();
//! assert_eq!(a, b);
//! assert_eq!(a.to_string(), "0x00ac00ac");
//! ```

use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::{CounterError, Result};

/// Identifier of a System V shared-memory segment.
///
/// The zero key (`IPC_PRIVATE`) is rejected: it always creates a fresh
/// anonymous segment and can never be shared by unrelated processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct SegmentKey(i32);

impl SegmentKey {
    /// Creates a key from its raw OS value.
    pub fn new(raw: i32) -> Result<Self> {
        if raw == 0 {
            return Err(CounterError::InvalidKey(
                "0 is IPC_PRIVATE and cannot name a shared segment".to_string(),
            ));
        }
        Ok(SegmentKey(raw))
    }

    /// Derives a key from an existing path and a non-zero project id, the
    /// same way `ftok(3)` does for every other System V IPC user.
    ///
    /// Two processes passing the same path and `proj_id` get the same key
    /// as long as the file is not replaced in between.
    #[cfg(unix)]
    pub fn from_path(path: impl AsRef<std::path::Path>, proj_id: u8) -> Result<Self> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let path = path.as_ref();
        if proj_id == 0 {
            return Err(CounterError::InvalidKey(
                "ftok project id must be non-zero".to_string(),
            ));
        }
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| CounterError::InvalidKey(format!("{} contains NUL", path.display())))?;

        // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
        let raw = unsafe { libc::ftok(c_path.as_ptr(), libc::c_int::from(proj_id)) };
        if raw == -1 {
            return Err(CounterError::InvalidKey(format!(
                "ftok({}): {}",
                path.display(),
                std::io::Error::last_os_error()
            )));
        }
        SegmentKey::new(raw as i32)
    }

    /// Returns the raw OS value of this key.
    #[inline]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl Display for SegmentKey {
    /// Formats the key as eight hex digits, the way `ipcs` prints it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl FromStr for SegmentKey {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || CounterError::InvalidKey(format!("cannot parse {s:?}"));

        let raw = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).map_err(|_| invalid())? as i32
        } else if let Ok(v) = s.parse::<i32>() {
            v
        } else {
            s.parse::<u32>().map_err(|_| invalid())? as i32
        };
        SegmentKey::new(raw)
    }
}

impl TryFrom<String> for SegmentKey {
    type Error = CounterError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SegmentKey> for String {
    fn from(key: SegmentKey) -> Self {
        key.to_string()
    }
}
