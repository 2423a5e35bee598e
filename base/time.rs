// This file is part of Lantern NVR, a lightweight network video recorder.
// Copyright (C) 2025 The Lantern NVR Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-v3.0-or-later WITH GPL-3.0-linking-exception.

//! Time and durations for Lantern NVR's internal format.
//!
//! The catalog stores wall-clock times as whole seconds since the epoch;
//! sub-second precision lives only in media timestamps, which are opaque to
//! this layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;

/// A time specified as seconds since 1970-01-01 00:00:00 UTC, excluding leap
/// seconds.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Time(pub i64);

impl Time {
    pub const MIN: Self = Time(i64::MIN);
    pub const MAX: Self = Time(i64::MAX);

    pub fn new(ts: time::Timespec) -> Self {
        Time(ts.sec)
    }

    pub fn as_secs(self) -> i64 {
        self.0
    }
}

impl ops::Add<Duration> for Time {
    type Output = Time;
    fn add(self, rhs: Duration) -> Time {
        Time(self.0 + rhs.0)
    }
}

impl ops::Sub<Duration> for Time {
    type Output = Time;
    fn sub(self, rhs: Duration) -> Time {
        Time(self.0 - rhs.0)
    }
}

impl ops::Sub for Time {
    type Output = Duration;
    fn sub(self, rhs: Time) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A duration of wall-clock time, in seconds. May be negative.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Duration(pub i64);

impl Duration {
    pub fn seconds(s: i64) -> Self {
        Duration(s)
    }

    pub fn days(d: i64) -> Self {
        Duration(d * 86400)
    }

    pub fn as_secs(self) -> i64 {
        self.0
    }
}

impl ops::Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl ops::Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut seconds = self.0;
        if seconds < 0 {
            write!(f, "-")?;
            seconds = -seconds;
        }
        const UNITS: [(i64, &str); 4] = [(86400, "d"), (3600, "h"), (60, "m"), (1, "s")];
        let mut printed = false;
        for &(n, label) in &UNITS {
            if seconds >= n || (label == "s" && !printed) {
                write!(
                    f,
                    "{}{}{}",
                    if printed { " " } else { "" },
                    seconds / n,
                    label
                )?;
                seconds %= n;
                printed = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let t = Time(100);
        assert_eq!(t + Duration::seconds(5), Time(105));
        assert_eq!(t - Duration::seconds(5), Time(95));
        assert_eq!(Time(105) - Time(100), Duration(5));
        assert_eq!(Duration::days(2), Duration(172800));
    }

    #[test]
    fn display_duration() {
        assert_eq!(Duration(0).to_string(), "0s");
        assert_eq!(Duration(59).to_string(), "59s");
        assert_eq!(Duration(3600).to_string(), "1h");
        assert_eq!(Duration(90061).to_string(), "1d 1h 1m 1s");
        assert_eq!(Duration(-60).to_string(), "-1m");
    }
}
