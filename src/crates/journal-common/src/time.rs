//! Time units for journal timestamps.
//!
//! Journal stores keep realtime and monotonic timestamps in microseconds.
//! These wrappers keep seconds and microseconds apart so a seek target can
//! never be handed to the backend in the wrong unit.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp in whole seconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Seconds(pub u32);

/// Timestamp in microseconds, either since Unix epoch (realtime) or since
/// boot (monotonic).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Microseconds(pub u64);

impl Seconds {
    pub fn new(seconds: u32) -> Self {
        Self(seconds)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Whole seconds elapsed between the epoch and `time`.
    ///
    /// Sub-second precision is discarded. Returns `None` for times before the
    /// epoch or past the range of the type.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let elapsed = time.duration_since(UNIX_EPOCH).ok()?;
        u32::try_from(elapsed.as_secs()).ok().map(Seconds)
    }

    pub fn to_microseconds(self) -> Microseconds {
        Microseconds(self.0 as u64 * 1_000_000)
    }
}

impl Microseconds {
    pub fn new(microseconds: u64) -> Self {
        Self(microseconds)
    }

    /// Get the current realtime as microseconds since Unix epoch.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Exact microseconds elapsed between the epoch and `time`.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let elapsed = time.duration_since(UNIX_EPOCH).ok()?;
        u64::try_from(elapsed.as_micros()).ok().map(Microseconds)
    }

    /// Interpret this value as a realtime timestamp.
    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_micros(self.0)
    }

    /// Convert to seconds (truncates).
    pub fn to_seconds(self) -> Seconds {
        Seconds((self.0 / 1_000_000) as u32)
    }

    /// Number of microseconds in `duration`, saturating at `u64::MAX`.
    pub fn from_duration(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
    }
}

impl From<Seconds> for Microseconds {
    fn from(s: Seconds) -> Self {
        s.to_microseconds()
    }
}

impl From<u64> for Microseconds {
    fn from(us: u64) -> Self {
        Microseconds(us)
    }
}

impl std::fmt::Display for Seconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl std::fmt::Display for Microseconds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}µs", self.0)
    }
}

/// Gets the current monotonic timestamp in microseconds since boot.
///
/// Uses CLOCK_MONOTONIC, which matches how journal writers stamp the
/// monotonic field of an entry.
pub fn monotonic_now() -> std::io::Result<Microseconds> {
    use nix::sys::time::TimeValLike;
    use nix::time::ClockId;

    let ts = ClockId::CLOCK_MONOTONIC
        .now()
        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

    Ok(Microseconds::new(ts.num_microseconds() as u64))
}
