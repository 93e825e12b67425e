//! Token-bucket send pacing

use crate::error::{BenchError, BenchResult};

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::time::Duration;

/// Interval between cells for `rps` messages per second
///
/// `None` when the rate is not finite and positive, or so small that the
/// interval does not fit in a [`Duration`].
pub fn send_period(rps: f64) -> Option<Duration> {
    if !(rps.is_finite() && rps > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / rps).ok()
}

/// Per-pacer send rate limiter backed by `governor`
///
/// The quota replenishes one cell every `1 / rate` seconds, so fractional
/// rates such as 0.5 msg/s are honoured exactly.
pub struct SendRateLimiter {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    rate_limit: Option<f64>,
}

impl SendRateLimiter {
    /// Create a limiter for `rate_limit` messages per second
    ///
    /// `None`, zero, negative and non-finite rates disable limiting, as does
    /// a rate so high that the interval rounds to zero.
    ///
    /// # Errors
    /// Returns a config error for a positive rate whose interval overflows.
    pub fn new(rate_limit: Option<f64>) -> BenchResult<Self> {
        let limiter = match rate_limit.filter(|rps| rps.is_finite() && *rps > 0.0) {
            None => None,
            Some(rps) => {
                let period = send_period(rps).ok_or_else(|| {
                    BenchError::config(format!("rate limit {rps} msg/s is too small"))
                })?;
                Quota::with_period(period).map(RateLimiter::direct)
            }
        };

        Ok(Self {
            limiter,
            rate_limit,
        })
    }

    /// Wait until the next send is allowed
    pub async fn wait(&self) {
        if let Some(ref limiter) = self.limiter {
            limiter.until_ready().await;
        }
    }

    /// Whether limiting is active
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Configured rate (messages per second)
    pub fn rate_limit(&self) -> Option<f64> {
        self.rate_limit
    }
}

impl std::fmt::Debug for SendRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendRateLimiter")
            .field("rate_limit", &self.rate_limit)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Instant;

    #[test]
    fn test_rate_limiter_disabled() {
        let limiter = SendRateLimiter::new(None).unwrap();
        assert!(!limiter.is_enabled());
        assert_eq!(limiter.rate_limit(), None);
    }

    #[test]
    fn test_rate_limiter_rejects_non_positive() {
        for rps in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(!SendRateLimiter::new(Some(rps)).unwrap().is_enabled());
        }
    }

    #[test]
    fn test_rate_limiter_enabled() {
        let limiter = SendRateLimiter::new(Some(250.0)).unwrap();
        assert!(limiter.is_enabled());
        assert_eq!(limiter.rate_limit(), Some(250.0));
    }

    #[test]
    fn test_rate_limiter_tiny_rate_is_config_error() {
        let err = SendRateLimiter::new(Some(1e-20)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Config);
        assert!(send_period(1e-20).is_none());
    }

    #[test]
    fn test_send_period() {
        assert_eq!(send_period(4.0), Some(Duration::from_millis(250)));
        assert_eq!(send_period(0.5), Some(Duration::from_secs(2)));
        assert_eq!(send_period(0.0), None);
    }

    #[tokio::test]
    async fn test_rate_limiter_fractional_rate() {
        let limiter = SendRateLimiter::new(Some(0.5)).unwrap();
        limiter.wait().await;
        // Next cell arrives two seconds later.
        let second = tokio::time::timeout(Duration::from_millis(200), limiter.wait()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_sends() {
        let limiter = SendRateLimiter::new(Some(100.0)).unwrap();
        let start = Instant::now();
        for _ in 0..6 {
            limiter.wait().await;
        }
        // First cell is immediate, the remaining five take ~10ms each.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_rate_limiter_debug() {
        let debug = format!("{:?}", SendRateLimiter::new(Some(100.0)).unwrap());
        assert!(debug.contains("SendRateLimiter"));
        assert!(debug.contains("100.0"));
        assert!(debug.contains("true"));
    }
}
