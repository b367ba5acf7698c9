//! Time source for the acquisition loop.
//!
//! Everything that reads the wall clock or sleeps goes through [`Clock`], so
//! tests can drive the retry loop with a [`ManualClock`] instead of sleeping.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to.
///
/// `sleep` advances the clock by the requested duration and returns at once.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poison| poison.into_inner());
        *now += to_chrono(duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Convert a std duration, saturating at chrono's maximum.
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Elapsed std duration between two instants, zero when `to` is earlier.
pub(crate) fn elapsed_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    to.signed_duration_since(from)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances_time() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        clock.sleep(Duration::from_millis(1500));
        assert_eq!(clock.now() - start, chrono::Duration::milliseconds(1500));

        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now() - start, chrono::Duration::milliseconds(61_500));
    }

    #[test]
    fn test_elapsed_between_clamps_negative_spans() {
        let start = Utc::now();
        let later = start + chrono::Duration::seconds(3);

        assert_eq!(elapsed_between(start, later), Duration::from_secs(3));
        assert_eq!(elapsed_between(later, start), Duration::ZERO);
    }

    #[test]
    fn test_system_clock_is_monotone_enough() {
        let clock = SystemClock;
        let a = clock.now();
        clock.sleep(Duration::from_millis(5));
        assert!(clock.now() >= a);
    }
}
