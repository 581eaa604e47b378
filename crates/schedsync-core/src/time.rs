//! Time windows for bookings and calendar queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A time window in UTC.
///
/// Represents a half-open interval `[start, end)`. The end is always
/// strictly after the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Self> {
        if start >= end {
            return Err(CoreError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, min, 0).unwrap()
    }

    #[test]
    fn rejects_inverted_window() {
        let err = TimeWindow::new(utc(11, 0), utc(10, 0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidWindow { .. }));
    }

    #[test]
    fn rejects_empty_window() {
        assert!(TimeWindow::new(utc(10, 0), utc(10, 0)).is_err());
    }
}
