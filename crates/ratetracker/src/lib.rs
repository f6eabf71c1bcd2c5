// Rust guideline compliant 2026-02-16

//! Smooth, exponentially time-decayed rate estimator.
//!
//! [`RateTracker`] implements the bias-corrected smooth-rate estimate used to
//! derive each topic's messages-per-second and bytes-per-second figures. The
//! smoothing formula is taken from the half-life decay construction described
//! at <https://stackoverflow.com/a/23617678>.

use std::sync::OnceLock;
use std::time::Instant;

/// Half-life of the exponential decay, in seconds.
const HALF_LIFE_SECS: f64 = 1.0;

/// `ln(2)`, used to derive the decay constant from the half-life.
const LN2: f64 = std::f64::consts::LN_2;

/// Decay constant `D = ln(2) / H`.
const DECAY: f64 = LN2 / HALF_LIFE_SECS;

/// Process-wide warm-up epoch, captured at first use of any tracker so every
/// tracker shares the same bias-correction reference point.
fn process_epoch() -> Instant {
    static T0: OnceLock<Instant> = OnceLock::new();
    *T0.get_or_init(Instant::now)
}

/// Exponentially-weighted smooth rate estimate with bias correction.
///
/// One instance tracks one quantity (message count or byte count) for one
/// topic. Construct with [`RateTracker::new`]; feed events with
/// [`notify`](Self::notify); query the current estimate with
/// [`rate_at`](Self::rate_at).
#[derive(Debug, Clone)]
pub struct RateTracker {
    lambda_last: f64,
    lambda_smooth_last: f64,
    last_event: Option<Instant>,
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RateTracker {
    /// Create a tracker with no events yet observed.
    #[must_use]
    pub fn new() -> Self {
        // Touch the process epoch so the first tracker constructed also
        // pins T0, matching the "static T0" semantics of the original design.
        let _ = process_epoch();
        Self {
            lambda_last: 0.0,
            lambda_smooth_last: 0.0,
            last_event: None,
        }
    }

    /// Record one event at the current instant.
    pub fn notify(&mut self) {
        self.notify_at(Instant::now());
    }

    /// Record one event at an explicit instant (used by tests to avoid
    /// depending on real wall-clock timing).
    pub fn notify_at(&mut self, now: Instant) {
        let delta = match self.last_event {
            Some(last) => now.saturating_duration_since(last).as_secs_f64(),
            None => 0.0,
        };
        let exp_l = (-DECAY * delta).exp();

        self.lambda_smooth_last =
            DECAY * delta * exp_l * self.lambda_last + exp_l * self.lambda_smooth_last;
        self.lambda_last = DECAY + exp_l * self.lambda_last;
        self.last_event = Some(now);
    }

    /// Query the bias-corrected rate estimate at `now`.
    ///
    /// Returns `0.0` if no event has been observed yet.
    #[must_use]
    pub fn rate_at(&self, now: Instant) -> f64 {
        let Some(last) = self.last_event else {
            return 0.0;
        };
        let delta = now.saturating_duration_since(last).as_secs_f64();
        let exp_l = (-DECAY * delta).exp();

        let t0_delta = now.saturating_duration_since(process_epoch()).as_secs_f64();
        let bias = (1.0 + DECAY * t0_delta) * (-DECAY * t0_delta).exp();

        let numerator = DECAY * delta * exp_l * self.lambda_last + exp_l * self.lambda_smooth_last;
        let denominator = 1.0 - bias;
        if denominator <= 0.0 {
            0.0
        } else {
            (numerator / denominator).max(0.0)
        }
    }

    /// Query the rate estimate at the current instant.
    #[must_use]
    pub fn rate_now(&self) -> f64 {
        self.rate_at(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::RateTracker;
    use std::time::{Duration, Instant};

    #[test]
    fn fresh_tracker_has_zero_rate() {
        let tracker = RateTracker::new();
        assert_eq!(tracker.rate_now(), 0.0);
    }

    #[test]
    fn steady_one_hz_converges_near_one() {
        let mut tracker = RateTracker::new();
        let mut t = Instant::now();
        for _ in 0..200 {
            tracker.notify_at(t);
            t += Duration::from_secs(1);
        }
        let rate = tracker.rate_at(t);
        assert!(
            (rate - 1.0).abs() < 0.05,
            "expected rate near 1.0 Hz, got {rate}"
        );
    }

    #[test]
    fn burst_then_silence_decays_toward_zero() {
        let mut tracker = RateTracker::new();
        let mut t = Instant::now();
        for _ in 0..50 {
            tracker.notify_at(t);
            t += Duration::from_millis(10);
        }
        let immediate = tracker.rate_at(t);
        assert!(immediate > 1.0, "expected high rate right after burst");

        let later = tracker.rate_at(t + Duration::from_secs(10));
        assert!(
            later < immediate / 10.0,
            "expected rate to decay well below {immediate} after 10s silence, got {later}"
        );
    }

    #[test]
    fn rate_is_never_negative() {
        let mut tracker = RateTracker::new();
        tracker.notify();
        for ms in [0u64, 1, 10, 1000, 60_000] {
            let rate = tracker.rate_at(Instant::now() + Duration::from_millis(ms));
            assert!(rate >= 0.0, "rate went negative: {rate}");
        }
    }
}
