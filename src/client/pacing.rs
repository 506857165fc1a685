//! Fixed-floor pacing between outbound provider calls.
//!
//! Epistemic foundation:
//! - K_i: Providers enforce aggregate rate limits we cannot observe up front
//! - K_i: Calls run strictly one after another, so one timestamp suffices
//! - I^R: The floor is user-configured (`request_pause_seconds`)

use std::time::{Duration, Instant};
use tracing::debug;

/// Process-wide minimum delay between consecutive provider calls.
///
/// `wait()` before a call, `mark()` once it returns. The first call of a
/// run never waits.
#[derive(Debug)]
pub struct PacingController {
    /// Minimum pause after a call returns
    pause: Duration,
    /// When the previous call returned
    last_call: Option<Instant>,
    /// Earliest start for the next call requested by a provider
    hold_until: Option<Instant>,
    /// Stats
    total_calls: u64,
    total_wait: Duration,
}

impl PacingController {
    /// Create a controller with the given floor.
    pub fn new(pause: Duration) -> Self {
        Self {
            pause,
            last_call: None,
            hold_until: None,
            total_calls: 0,
            total_wait: Duration::ZERO,
        }
    }

    /// Create a controller from a floor in seconds.
    ///
    /// Negative and NaN values are treated as zero; values too large for a
    /// `Duration` saturate.
    pub fn from_secs_f64(secs: f64) -> Self {
        let pause = if secs > 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self::new(pause)
    }

    /// Keep the next call from starting before `delay` has passed.
    ///
    /// Extends the floor, never shortens it.
    pub fn hold(&mut self, delay: Duration) {
        self.hold_until = self.hold_until.max(Instant::now().checked_add(delay));
    }

    /// Configured floor.
    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Time left before the next call may start.
    pub fn wait_time(&self) -> Duration {
        let floor = match self.last_call {
            Some(last) => self.pause.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        };
        let held = self
            .hold_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);
        floor.max(held)
    }

    /// Sleep until the floor since the previous call has passed.
    ///
    /// Returns the duration waited.
    pub async fn wait(&mut self) -> Duration {
        let wait_time = self.wait_time();

        if wait_time > Duration::ZERO {
            debug!(wait_ms = wait_time.as_millis() as u64, "Pacing before next call");
            tokio::time::sleep(wait_time).await;
            self.total_wait = self.total_wait.saturating_add(wait_time);
        }
        self.hold_until = None;

        wait_time
    }

    /// Record that a call just returned.
    pub fn mark(&mut self) {
        self.total_calls += 1;
        self.last_call = Some(Instant::now());
    }

    /// Get statistics.
    pub fn stats(&self) -> PacingStats {
        PacingStats {
            total_calls: self.total_calls,
            total_wait_secs: self.total_wait.as_secs_f64(),
        }
    }
}

/// Pacing statistics.
#[derive(Debug, Clone)]
pub struct PacingStats {
    pub total_calls: u64,
    pub total_wait_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let mut pacing = PacingController::from_secs_f64(5.0);
        let start = Instant::now();
        assert_eq!(pacing.wait().await, Duration::ZERO);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_enforces_floor_after_mark() {
        let mut pacing = PacingController::new(Duration::from_millis(80));
        pacing.wait().await;
        pacing.mark();

        let start = Instant::now();
        pacing.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(70));
        assert_eq!(pacing.stats().total_calls, 1);
        assert!(pacing.stats().total_wait_secs > 0.0);
    }

    #[tokio::test]
    async fn test_no_wait_when_floor_already_elapsed() {
        let mut pacing = PacingController::new(Duration::from_millis(10));
        pacing.mark();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pacing.wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_negative_pause_is_zero() {
        assert_eq!(PacingController::from_secs_f64(-2.0).pause(), Duration::ZERO);
        assert_eq!(PacingController::from_secs_f64(f64::NAN).pause(), Duration::ZERO);
    }

    #[test]
    fn test_from_secs_f64_saturates_instead_of_panicking() {
        assert_eq!(PacingController::from_secs_f64(1e20).pause(), Duration::MAX);
        assert_eq!(PacingController::from_secs_f64(f64::INFINITY).pause(), Duration::MAX);
        assert_eq!(PacingController::from_secs_f64(-1.0).pause(), Duration::ZERO);
        assert_eq!(PacingController::from_secs_f64(f64::NAN).pause(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_hold_extends_floor_once() {
        let mut pacing = PacingController::new(Duration::from_millis(10));
        pacing.mark();
        pacing.hold(Duration::from_millis(120));
        assert!(pacing.wait_time() > Duration::from_millis(100));

        let start = Instant::now();
        pacing.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(100));

        pacing.mark();
        assert!(pacing.wait_time() <= Duration::from_millis(10));
    }
}
