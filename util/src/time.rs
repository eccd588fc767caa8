//! General time utility functions

use chrono;
use std::time::Duration;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a chrono duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    if let Some(ns) = duration.num_nanoseconds() {
        Some(ns as f64 / NANOS_PER_SECOND as f64)
    }
    else {
        None
    }
}

/// Build a std duration from a number of seconds, treating negative or
/// non-finite values as zero.
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    }
    else {
        Duration::from_secs(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duration_conversions() {
        assert_eq!(
            duration_to_seconds(chrono::Duration::milliseconds(1500)), 
            Some(1.5)
        );
        assert_eq!(seconds_to_duration(-1.0), Duration::from_secs(0));
        assert_eq!(seconds_to_duration(f64::NAN), Duration::from_secs(0));
        assert_eq!(seconds_to_duration(0.25), Duration::from_millis(250));
    }
}
