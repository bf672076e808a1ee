use crate::config::{CircuitBreakerConfig, RetryConfig};
use crate::fetcher::traits::PriceFetcher;
use crate::model::{AssetId, FetchError, Sample};

use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Exponential delay before retrying after `attempt` (1-based) failed, without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_backoff: Duration::from_millis(cfg.base_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let max_ms = (delay.as_millis() / 2) as u64;
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

/// Consecutive-failure breaker. Opens after `failure_threshold` failed calls, rejects calls
/// for `cooldown`, then lets a single trial call through.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        matches!(state.open_until, Some(until) if Instant::now() < until)
    }

    fn try_acquire(&self) -> Result<BreakerPermit<'_>, FetchError> {
        let mut state = self.lock();
        let trial = match state.open_until {
            None => false,
            Some(until) if Instant::now() < until => return Err(FetchError::CircuitOpen),
            Some(_) if state.trial_in_flight => return Err(FetchError::CircuitOpen),
            Some(_) => {
                info!("🔌 Circuit half-open, allowing trial call");
                state.trial_in_flight = true;
                true
            }
        };
        Ok(BreakerPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn record_success(&self) {
        let mut state = self.lock();
        if state.open_until.is_some() {
            info!("🔌 Circuit closed");
        }
        *state = BreakerState::default();
    }

    fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures += 1;
        let was_trial = state.trial_in_flight;
        state.trial_in_flight = false;
        if was_trial || state.consecutive_failures >= self.failure_threshold {
            warn!(
                "🔌 Circuit open for {:?} after {} consecutive failures",
                self.cooldown, state.consecutive_failures
            );
            state.open_until = Some(Instant::now() + self.cooldown);
        }
    }
}

/// Leave to make one upstream call. Dropping an unsettled trial permit counts as a failed trial.
struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            warn!("🔌 Trial call abandoned before it finished");
            self.breaker.record_failure();
        }
    }
}

impl From<&CircuitBreakerConfig> for CircuitBreaker {
    fn from(cfg: &CircuitBreakerConfig) -> Self {
        Self::new(cfg.failure_threshold, Duration::from_secs(cfg.cooldown_secs))
    }
}

/// Wraps another fetcher with bounded retries and a circuit breaker.
/// Every failure still surfaces as a `FetchError`.
pub struct ResilientFetcher {
    inner: Arc<dyn PriceFetcher>,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl ResilientFetcher {
    pub fn new(inner: Arc<dyn PriceFetcher>, policy: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    #[cfg(test)]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait::async_trait]
impl PriceFetcher for ResilientFetcher {
    async fn fetch(&self, asset: &AssetId, window_days: u32) -> Result<Vec<Sample>, FetchError> {
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(e) => {
                warn!("⛔ Skipping fetch for {}: circuit open", asset);
                return Err(e);
            }
        };

        let mut attempt = 1;
        loop {
            match self.inner.fetch(asset, window_days).await {
                Ok(samples) => {
                    permit.success();
                    return Ok(samples);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    let base = self.policy.delay_for(attempt);
                    let delay = base + jitter(base);
                    warn!(
                        "🔁 Fetch attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt, self.policy.max_attempts, asset, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    // Non-transient errors prove the upstream answered.
                    if e.is_transient() {
                        permit.failure();
                    } else {
                        permit.success();
                    }
                    debug!("Fetch for {} gave up after {} attempt(s)", asset, attempt);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::ScriptedFetcher;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    /// Fails the first call with a 503, never answers the second, succeeds afterwards.
    #[derive(Default)]
    struct StallsOnSecondCall {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriceFetcher for StallsOnSecondCall {
        async fn fetch(&self, _asset: &AssetId, _window_days: u32) -> Result<Vec<Sample>, FetchError> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(server_error()),
                1 => std::future::pending().await,
                _ => Ok(vec![Sample::new(1, 1.0)]),
            }
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn server_error() -> FetchError {
        FetchError::Status {
            status: 503,
            body: String::new(),
        }
    }

    fn bitcoin() -> AssetId {
        AssetId::parse("bitcoin").unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(3_000),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(3_000));
    }

    #[test]
    fn jitter_is_at_most_half_the_delay() {
        for _ in 0..100 {
            assert!(jitter(Duration::from_millis(100)) <= Duration::from_millis(50));
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let inner = ScriptedFetcher::new(vec![
            Err(FetchError::Transport("reset".into())),
            Err(server_error()),
            Ok(vec![Sample::new(1, 1.0)]),
        ]);
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(3), CircuitBreaker::new(5, Duration::from_secs(60)));

        let samples = fetcher.fetch(&bitcoin(), 30).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = ScriptedFetcher::new(vec![Err(server_error()), Err(server_error()), Err(server_error())]);
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(2), CircuitBreaker::new(5, Duration::from_secs(60)));

        let err = fetcher.fetch(&bitcoin(), 30).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let inner = ScriptedFetcher::new(vec![
            Err(FetchError::Status {
                status: 404,
                body: "coin not found".into(),
            }),
            Ok(vec![Sample::new(1, 1.0)]),
        ]);
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(3), CircuitBreaker::new(5, Duration::from_secs(60)));

        let err = fetcher.fetch(&bitcoin(), 30).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_fails_fast() {
        let inner = ScriptedFetcher::new(vec![Err(server_error()), Err(server_error()), Ok(vec![])]);
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(1), CircuitBreaker::new(2, Duration::from_secs(60)));

        assert!(fetcher.fetch(&bitcoin(), 30).await.is_err());
        assert!(!fetcher.breaker().is_open());
        assert!(fetcher.fetch(&bitcoin(), 30).await.is_err());
        assert!(fetcher.breaker().is_open());

        let err = fetcher.fetch(&bitcoin(), 30).await.unwrap_err();
        assert!(matches!(err, FetchError::CircuitOpen));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn breaker_half_opens_after_cooldown() {
        let inner = ScriptedFetcher::new(vec![
            Err(server_error()),
            Ok(vec![Sample::new(1, 1.0)]),
            Ok(vec![Sample::new(2, 2.0)]),
        ]);
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(1), CircuitBreaker::new(1, Duration::from_millis(30)));

        assert!(fetcher.fetch(&bitcoin(), 30).await.is_err());
        assert!(matches!(fetcher.fetch(&bitcoin(), 30).await, Err(FetchError::CircuitOpen)));

        sleep(Duration::from_millis(60)).await;
        assert!(fetcher.fetch(&bitcoin(), 30).await.is_ok());
        assert!(!fetcher.breaker().is_open());
        assert!(fetcher.fetch(&bitcoin(), 30).await.is_ok());
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn failed_trial_reopens_breaker() {
        let inner = ScriptedFetcher::new(vec![Err(server_error()), Err(server_error())]);
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(1), CircuitBreaker::new(1, Duration::from_millis(30)));

        assert!(fetcher.fetch(&bitcoin(), 30).await.is_err());
        sleep(Duration::from_millis(60)).await;
        assert!(matches!(fetcher.fetch(&bitcoin(), 30).await, Err(FetchError::Status { .. })));
        assert!(fetcher.breaker().is_open());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn abandoned_trial_does_not_wedge_breaker() {
        let inner = Arc::new(StallsOnSecondCall::default());
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(1), CircuitBreaker::new(1, Duration::from_millis(30)));

        assert!(fetcher.fetch(&bitcoin(), 30).await.is_err());
        sleep(Duration::from_millis(60)).await;

        // The half-open trial hangs and is dropped by the caller's deadline.
        assert!(timeout(Duration::from_millis(20), fetcher.fetch(&bitcoin(), 30)).await.is_err());
        assert!(fetcher.breaker().is_open());
        assert!(matches!(fetcher.fetch(&bitcoin(), 30).await, Err(FetchError::CircuitOpen)));

        sleep(Duration::from_millis(60)).await;
        assert!(fetcher.fetch(&bitcoin(), 30).await.is_ok());
        assert!(!fetcher.breaker().is_open());
        assert!(fetcher.fetch(&bitcoin(), 30).await.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn dropped_closed_call_is_not_counted() {
        let inner = Arc::new(StallsOnSecondCall::default());
        let fetcher = ResilientFetcher::new(inner.clone(), no_wait(1), CircuitBreaker::new(2, Duration::from_secs(60)));

        assert!(fetcher.fetch(&bitcoin(), 30).await.is_err());
        assert!(timeout(Duration::from_millis(20), fetcher.fetch(&bitcoin(), 30)).await.is_err());
        assert!(!fetcher.breaker().is_open());
        assert!(fetcher.fetch(&bitcoin(), 30).await.is_ok());
    }
}
