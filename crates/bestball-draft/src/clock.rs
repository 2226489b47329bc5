// Server time source shared by the commit path, the timer, and the ping reply.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// A server-trusted time source.
///
/// Every deadline written to the store and every expiry decision made by the
/// timer goes through one of these, so tests can substitute a controllable
/// clock without touching the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time anchored once at construction and then advanced by the
/// monotonic tokio clock.
///
/// Because elapsed time is measured with `tokio::time::Instant`, a runtime
/// with paused time (`tokio::time::pause`) drives this clock too: timer tests
/// advance tokio time and the draft clock follows exactly, with no real
/// sleeping.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl MonotonicClock {
    /// Anchor at the current UTC time.
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor at an explicit instant. Useful for deterministic tests.
    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        MonotonicClock {
            anchor,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.origin.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.anchor + elapsed
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().expect("clock mutex poisoned") = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock mutex poisoned")
    }
}

/// Convert a chrono span to a std duration, clamping negatives to zero.
pub fn until(from: DateTime<Utc>, to: DateTime<Utc>) -> std::time::Duration {
    (to - from).to_std().unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap()
    }

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new(t0());
        assert_eq!(clock.now(), t0());
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), t0() + Duration::seconds(30));
        clock.set(t0());
        assert_eq!(clock.now(), t0());
    }

    #[tokio::test]
    async fn monotonic_clock_follows_paused_tokio_time() {
        tokio::time::pause();
        let clock = MonotonicClock::anchored_at(t0());
        assert_eq!(clock.now(), t0());

        tokio::time::advance(std::time::Duration::from_secs(12)).await;
        assert_eq!(clock.now(), t0() + Duration::seconds(12));
    }

    #[test]
    fn until_clamps_past_instants_to_zero() {
        assert_eq!(until(t0(), t0() - Duration::seconds(5)), std::time::Duration::ZERO);
        assert_eq!(
            until(t0(), t0() + Duration::milliseconds(1500)),
            std::time::Duration::from_millis(1500)
        );
    }
}
