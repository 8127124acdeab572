//! Wall-clock timestamps.
//!
//! Timestamps are carried as a [`Duration`] since the Unix epoch, and
//! converted to the protobuf `Timestamp` only at the wire boundary.

use crate::payload::Timestamp;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time since the Unix epoch.
///
/// A clock set before 1970 yields `Duration::ZERO`.
pub fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// Convert a protobuf timestamp to a duration since the epoch.
///
/// Pre-epoch timestamps are floored to `Duration::ZERO`.
pub fn timestamp_to_duration(ts: &Timestamp) -> Duration {
    if ts.seconds < 0 || ts.nanos < 0 {
        return Duration::ZERO;
    }
    Duration::new(ts.seconds as u64, ts.nanos as u32)
}

/// Convert a duration since the epoch to a protobuf timestamp.
pub fn duration_to_timestamp(duration: Duration) -> Timestamp {
    let seconds = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
    Timestamp {
        seconds,
        nanos: duration.subsec_nanos() as i32,
    }
}

/// Render a duration since the epoch as a UTC date-time, for logging.
pub fn to_datetime(duration: Duration) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(duration.as_secs()).ok()?;
    DateTime::from_timestamp(secs, duration.subsec_nanos())
}
