//! Resilience wrappers — rate limiting, circuit breaking, retries,
//! request correlation.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::warn;
use uuid::Uuid;

// =============================================================================
// Correlation
// =============================================================================

/// Fresh correlation id for an inbound request. Logged on every line of
/// the request span and echoed in responses.
pub fn correlation_id() -> String {
    Uuid::new_v4().as_hyphenated().to_string()
}

// =============================================================================
// Token bucket rate limiter
// =============================================================================

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-identity token buckets. One bucket per session (or per client IP
/// for pre-session calls).
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    refill_per_sec: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            refill_per_sec,
            burst: burst as f64,
        }
    }

    /// Take one token for `identity`. `false` means over the limit.
    pub fn check(&self, identity: &str) -> bool {
        self.check_at(identity, Instant::now())
    }

    fn check_at(&self, identity: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(identity.to_string()).or_insert(TokenBucket {
            tokens: self.burst,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.burst);
        bucket.last_refill = now;
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            metrics::counter!("rate_limited_total").increment(1);
            false
        }
    }

    /// Drop buckets that have fully refilled — they carry no state worth
    /// keeping.
    pub fn prune(&self) {
        let now = Instant::now();
        self.buckets.lock().retain(|_, b| {
            let elapsed = now.duration_since(b.last_refill).as_secs_f64();
            b.tokens + elapsed * self.refill_per_sec < self.burst
        });
    }
}

// =============================================================================
// Circuit breaker
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Classic three-state breaker around an unreliable operation (here:
/// persistence writes). `Open` rejects immediately until the cool-down
/// elapses, then a single `HalfOpen` probe decides.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    cool_down: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            cool_down,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call may proceed right now. Transitions Open → HalfOpen
    /// when the cool-down has elapsed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.cool_down)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        let tripped = match inner.state {
            // A failed half-open probe re-opens immediately.
            CircuitState::HalfOpen => true,
            _ => inner.consecutive_failures >= self.failure_threshold,
        };
        if tripped {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            metrics::counter!("circuit_opened_total").increment(1);
        }
    }
}

// =============================================================================
// Retry with jittered exponential backoff
// =============================================================================

/// Retry an async operation up to `max_attempts` times with exponential
/// backoff and full jitter. Intended for idempotent internal operations
/// (persistence writes).
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= max_attempts => {
                warn!(label, attempt, error = %e, "giving up after retries");
                return Err(e);
            }
            Err(e) => {
                let cap = base_delay.saturating_mul(1 << (attempt - 1).min(16));
                let jittered = Duration::from_secs_f64(
                    rand::thread_rng().gen_range(0.0..cap.as_secs_f64().max(f64::EPSILON)),
                );
                warn!(label, attempt, error = %e, backoff_ms = jittered.as_millis() as u64, "retrying");
                tokio::time::sleep(jittered).await;
            }
        }
    }
}
