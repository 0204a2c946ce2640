//! Game time in whole minutes since the Unix epoch.
//!
//! Quest slots store timestamps in this unit, so delay checks are plain
//! integer arithmetic.

use std::sync::atomic::{AtomicU64, Ordering};
use chrono::Utc;

pub const MINUTES_IN_ONE_HOUR: u64 = 60;
pub const MINUTES_IN_ONE_DAY: u64 = 24 * MINUTES_IN_ONE_HOUR;
pub const MINUTES_IN_ONE_WEEK: u64 = 7 * MINUTES_IN_ONE_DAY;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now_minutes(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_minutes(&self) -> u64 {
        u64::try_from(Utc::now().timestamp() / 60).unwrap_or(0)
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug, Default)]
pub struct FixedClock {
    minutes: AtomicU64,
}

impl FixedClock {
    pub fn new(minutes: u64) -> Self {
        Self {
            minutes: AtomicU64::new(minutes),
        }
    }

    pub fn set(&self, minutes: u64) {
        self.minutes.store(minutes, Ordering::SeqCst);
    }

    pub fn advance(&self, minutes: u64) {
        self.minutes.fetch_add(minutes, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_minutes(&self) -> u64 {
        self.minutes.load(Ordering::SeqCst)
    }
}

/// Rough duration text, e.g. "1 day and 3 hours" or "12 minutes"
pub fn approx_duration(minutes: u64) -> String {
    if minutes == 0 {
        return "less than a minute".to_string();
    }
    let days = minutes / MINUTES_IN_ONE_DAY;
    let hours = (minutes % MINUTES_IN_ONE_DAY) / MINUTES_IN_ONE_HOUR;
    let mins = minutes % MINUTES_IN_ONE_HOUR;

    let unit = |n: u64, name: &str| {
        if n == 1 {
            format!("1 {}", name)
        } else {
            format!("{} {}s", n, name)
        }
    };

    if days > 0 {
        if hours > 0 {
            format!("{} and {}", unit(days, "day"), unit(hours, "hour"))
        } else {
            unit(days, "day")
        }
    } else if hours > 0 {
        if mins > 0 {
            format!("{} and {}", unit(hours, "hour"), unit(mins, "minute"))
        } else {
            unit(hours, "hour")
        }
    } else {
        unit(mins, "minute")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_duration() {
        assert_eq!(approx_duration(0), "less than a minute");
        assert_eq!(approx_duration(1), "1 minute");
        assert_eq!(approx_duration(59), "59 minutes");
        assert_eq!(approx_duration(60), "1 hour");
        assert_eq!(approx_duration(130), "2 hours and 10 minutes");
        assert_eq!(approx_duration(MINUTES_IN_ONE_DAY + 125), "1 day and 2 hours");
        assert_eq!(approx_duration(MINUTES_IN_ONE_WEEK), "7 days");
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(100);
        clock.advance(40);
        assert_eq!(clock.now_minutes(), 140);
        clock.set(5);
        assert_eq!(clock.now_minutes(), 5);
    }
}
