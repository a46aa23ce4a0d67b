use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::classify::{ClassifiedError, ErrorKind};
use crate::error::{Error, Result as CrateResult};

/// Retry tuning for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth per retry. Must be finite and at least 1.0.
    pub fn backoff_factor(mut self, factor: f64) -> CrateResult<Self> {
        if !(factor.is_finite() && factor >= 1.0) {
            return Err(Error::InvalidOption(format!(
                "backoff factor must be >= 1.0, got {factor}"
            )));
        }
        self.backoff_factor = factor;
        Ok(self)
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Unjittered delays before each retry: `min(initial * factor^i, max)`.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut state = RetryState::new(self);
        (0..self.max_retries)
            .map(|_| {
                let d = state.next_delay.min(self.max_delay);
                state.advance(self);
                d
            })
            .collect()
    }
}

/// Per-invocation retry bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempt: u32,
    pub next_delay: Duration,
}

impl RetryState {
    fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            next_delay: policy.initial_delay,
        }
    }

    /// The stored delay never exceeds `max_delay`, however many retries are allowed.
    fn advance(&mut self, policy: &RetryPolicy) {
        self.attempt = self.attempt.saturating_add(1);
        let grown = self.next_delay.as_secs_f64() * policy.backoff_factor;
        self.next_delay = Duration::try_from_secs_f64(grown)
            .unwrap_or(policy.max_delay)
            .min(policy.max_delay);
    }
}

/// Scale a delay by a uniform factor in [0.5, 1.5].
pub fn jittered(delay: Duration, rng: &mut impl Rng) -> Duration {
    let scaled = delay.as_secs_f64() * rng.gen_range(0.5..=1.5);
    Duration::try_from_secs_f64(scaled).unwrap_or(delay)
}

fn never_retried(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::NotFound | ErrorKind::Unavailable | ErrorKind::Fatal
    )
}

/// Bounded exponential-backoff retry around a single fallible async operation.
#[derive(Debug, Clone, Default)]
pub struct BackoffRetrier {
    policy: RetryPolicy,
}

impl BackoffRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let mut state = RetryState::new(&self.policy);
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.retryable || never_retried(err.kind) {
                debug!(%label, kind = %err.kind, "not retrying");
                return Err(err);
            }
            if state.attempt >= self.policy.max_retries {
                warn!(
                    %label,
                    max_retries = self.policy.max_retries,
                    error = %err,
                    "retries exhausted"
                );
                return Err(err);
            }

            let mut delay = state.next_delay.min(self.policy.max_delay);
            if self.policy.jitter {
                delay = jittered(delay, &mut rand::thread_rng());
            }
            warn!(
                %label,
                attempt = state.attempt + 1,
                of = self.policy.max_retries + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            state.advance(&self.policy);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::classify::classify;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn test_schedule_is_capped() {
        let policy = RetryPolicy::default()
            .max_retries(6)
            .max_delay(Duration::from_secs(10));
        assert_eq!(
            policy.schedule().last().copied(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let mut rng = rand::thread_rng();
        let base = Duration::from_secs(4);
        for _ in 0..1000 {
            let d = jittered(base, &mut rng);
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(6));
        }
    }

    #[test]
    fn test_long_schedule_stays_capped() {
        let policy = RetryPolicy::default().max_retries(100).jitter(false);
        let schedule = policy.schedule();
        assert_eq!(schedule.len(), 100);
        assert!(schedule.iter().all(|d| *d <= Duration::from_secs(30)));
        assert_eq!(schedule[99], Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_factor_validation() {
        for bad in [0.5, -2.0, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(RetryPolicy::default().backoff_factor(bad), Err(Error::InvalidOption(_))),
                "{bad}"
            );
        }
        let policy = RetryPolicy::default().backoff_factor(1.0).unwrap();
        assert_eq!(policy.schedule(), vec![Duration::from_secs(2); 3]);
    }

    fn counting_op(
        calls: Arc<AtomicU32>,
        succeed_on: Option<u32>,
        message: &'static str,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, ClassifiedError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(match succeed_on {
                Some(k) if n >= k => Ok(n),
                _ => Err(classify(message)),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let retrier = BackoffRetrier::new(RetryPolicy::default().jitter(false));
        let started = tokio::time::Instant::now();

        let err = retrier
            .run("op", counting_op(calls.clone(), None, "connection reset"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(err.message, "connection reset");
        // one initial attempt + three retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2 + 4 + 8));
        assert!(elapsed < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_retries_do_not_overflow() {
        let calls = Arc::new(AtomicU32::new(0));
        let retrier = BackoffRetrier::new(RetryPolicy::default().max_retries(100).jitter(false));
        let started = tokio::time::Instant::now();

        let err = retrier
            .run("op", counting_op(calls.clone(), None, "connection reset"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(calls.load(Ordering::SeqCst), 101);
        // 2 + 4 + 8 + 16, then 96 sleeps at the 30s cap
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30 + 96 * 30), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(30 + 96 * 30 + 1), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_jittered_sleeps_stay_in_band() {
        let calls = Arc::new(AtomicU32::new(0));
        let retrier = BackoffRetrier::new(RetryPolicy::default().max_retries(1));
        let c = calls.clone();
        let started = tokio::time::Instant::now();
        let mut slept = Vec::new();

        let err = retrier
            .run("op", || {
                c.fetch_add(1, Ordering::SeqCst);
                slept.push(started.elapsed());
                std::future::ready(Err::<(), _>(classify("read timeout")))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // single 2s base delay, scaled by [0.5, 1.5]
        let gap = slept[1] - slept[0];
        assert!(gap >= Duration::from_secs(1), "{gap:?}");
        assert!(gap <= Duration::from_millis(3001), "{gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let retrier = BackoffRetrier::new(RetryPolicy::default());
        let value = retrier
            .run("op", counting_op(calls.clone(), Some(3), "HTTP 429"))
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_kinds_never_retry() {
        for message in ["Video not found", "This video is private", "Sign in to confirm"] {
            let calls = Arc::new(AtomicU32::new(0));
            let retrier = BackoffRetrier::new(RetryPolicy::default());
            let err = retrier
                .run("op", counting_op(calls.clone(), None, message))
                .await
                .unwrap_err();
            assert_eq!(calls.load(Ordering::SeqCst), 1, "{message}");
            assert_eq!(err.message, message);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_never_retries_even_if_flagged() {
        let calls = Arc::new(AtomicU32::new(0));
        let retrier = BackoffRetrier::new(RetryPolicy::default());
        let c = calls.clone();
        let err = retrier
            .run("op", move || {
                c.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<(), _>(ClassifiedError {
                    kind: ErrorKind::Fatal,
                    message: "source too long".into(),
                    retryable: true,
                }))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
