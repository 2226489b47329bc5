// Client clock-offset estimation and compensated countdowns.
//
// Purely a display concern: nothing computed here is ever sent back to the
// server or used to decide whether a pick is on time.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Samples kept for the rolling estimate.
pub const DEFAULT_WINDOW: usize = 8;

/// One completed ping exchange, all times in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingSample {
    pub client_send_ms: i64,
    pub server_time_ms: i64,
    pub client_receive_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyEstimate {
    /// Server clock minus client clock.
    pub offset_ms: i64,
    pub round_trip_ms: i64,
}

/// Midpoint estimate: the server stamped its reply halfway through the
/// round trip.
pub fn estimate(sample: PingSample) -> LatencyEstimate {
    let midpoint = (sample.client_send_ms + sample.client_receive_ms) / 2;
    LatencyEstimate {
        offset_ms: sample.server_time_ms - midpoint,
        round_trip_ms: (sample.client_receive_ms - sample.client_send_ms).max(0),
    }
}

/// Server-side half of a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReply {
    pub client_send_ms: i64,
    pub server_time_ms: i64,
}

pub fn answer_ping(clock: &dyn Clock, client_send_ms: i64) -> PingReply {
    PingReply {
        client_send_ms,
        server_time_ms: clock.now().timestamp_millis(),
    }
}

/// What a client should show for the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub remaining_ms: i64,
    /// At or under the warning threshold.
    pub warning: bool,
    pub expired: bool,
}

/// Rolling offset/latency tracker kept by each client.
#[derive(Debug, Clone)]
pub struct LatencyCompensator {
    window: usize,
    samples: VecDeque<LatencyEstimate>,
}

impl Default for LatencyCompensator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl LatencyCompensator {
    pub fn new(window: usize) -> Self {
        LatencyCompensator {
            window: window.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, sample: PingSample) -> LatencyEstimate {
        let est = estimate(sample);
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(est);
        est
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Offset from the fastest exchange in the window; slow round trips carry
    /// the most asymmetry error. Zero before the first sample.
    pub fn offset_ms(&self) -> i64 {
        self.samples
            .iter()
            .min_by_key(|s| s.round_trip_ms)
            .map(|s| s.offset_ms)
            .unwrap_or(0)
    }

    pub fn average_round_trip_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: i64 = self.samples.iter().map(|s| s.round_trip_ms).sum();
        Some(total as f64 / self.samples.len() as f64)
    }

    /// Server time as seen from this client right now.
    pub fn server_now_ms(&self, local_now_ms: i64) -> i64 {
        local_now_ms + self.offset_ms()
    }

    /// Countdown to an authoritative deadline using the compensated clock.
    pub fn countdown(
        &self,
        deadline: Option<DateTime<Utc>>,
        local_now_ms: i64,
        warning_threshold_ms: i64,
    ) -> Option<Countdown> {
        let deadline = deadline?;
        let remaining_ms = (deadline.timestamp_millis() - self.server_now_ms(local_now_ms)).max(0);
        Some(Countdown {
            remaining_ms,
            warning: remaining_ms <= warning_threshold_ms,
            expired: remaining_ms == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn sample(send: i64, server: i64, recv: i64) -> PingSample {
        PingSample {
            client_send_ms: send,
            server_time_ms: server,
            client_receive_ms: recv,
        }
    }

    #[test]
    fn midpoint_offset() {
        // Client 2s behind the server, 200ms round trip.
        let est = estimate(sample(1_000, 3_100, 1_200));
        assert_eq!(est.offset_ms, 2_000);
        assert_eq!(est.round_trip_ms, 200);
    }

    #[test]
    fn fastest_sample_wins_and_window_rolls() {
        let mut comp = LatencyCompensator::new(3);
        comp.record(sample(0, 600, 400)); // offset 400, rtt 400
        comp.record(sample(1_000, 1_550, 1_100)); // offset 500, rtt 100
        comp.record(sample(2_000, 2_800, 2_600)); // offset 500, rtt 600
        assert_eq!(comp.offset_ms(), 500);
        assert_eq!(comp.average_round_trip_ms(), Some(1100.0 / 3.0));

        comp.record(sample(3_000, 3_330, 3_060)); // offset 300, rtt 60
        comp.record(sample(4_000, 4_500, 4_200));
        comp.record(sample(5_000, 5_500, 5_200));
        // The 60ms exchange is still inside the window.
        assert_eq!(comp.sample_count(), 3);
        assert_eq!(comp.offset_ms(), 300);
    }

    #[test]
    fn empty_compensator_has_zero_offset() {
        let comp = LatencyCompensator::default();
        assert_eq!(comp.offset_ms(), 0);
        assert_eq!(comp.average_round_trip_ms(), None);
        assert_eq!(comp.server_now_ms(42), 42);
    }

    #[test]
    fn clients_with_different_skew_see_same_countdown() {
        let deadline = Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 30).unwrap();
        let server_now = deadline.timestamp_millis() - 10_000;

        // Chicago: clock in sync, 40ms round trip.
        let mut chicago = LatencyCompensator::default();
        chicago.record(sample(server_now - 40, server_now - 20, server_now));
        // Manila: clock 3s fast, 400ms round trip.
        let manila_now = server_now + 3_000;
        let mut manila = LatencyCompensator::default();
        manila.record(sample(manila_now - 400, server_now - 200, manila_now));

        let a = chicago.countdown(Some(deadline), server_now, 10_000).unwrap();
        let b = manila.countdown(Some(deadline), manila_now, 10_000).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.remaining_ms, 10_000);
        assert!(a.warning);
        assert!(!a.expired);
    }

    #[test]
    fn countdown_clamps_at_zero() {
        let comp = LatencyCompensator::default();
        let deadline = Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 30).unwrap();
        let cd = comp
            .countdown(Some(deadline), deadline.timestamp_millis() + 5_000, 10_000)
            .unwrap();
        assert_eq!(cd.remaining_ms, 0);
        assert!(cd.expired);
        assert!(comp.countdown(None, 0, 10_000).is_none());
    }

    #[test]
    fn ping_reply_stamps_server_time() {
        let t = Utc.with_ymd_and_hms(2026, 9, 1, 18, 0, 0).unwrap();
        let clock = ManualClock::new(t);
        let reply = answer_ping(&clock, 17);
        assert_eq!(reply.client_send_ms, 17);
        assert_eq!(reply.server_time_ms, t.timestamp_millis());
    }
}
