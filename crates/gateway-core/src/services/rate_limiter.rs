//! Tier-indexed sliding-window rate limiter, KV-backed for correctness
//! across gateway replicas (spec.md §4.4, §9 "do not collapse breaker and
//! limiter").

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::models::identity::{ClientIdentity, Tier};
use crate::services::kv::KvStore;

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub tier: Tier,
    pub limit: u64,
    pub remaining: u64,
    /// Unix seconds at which the window resets.
    pub reset: u64,
    /// Window length in seconds, surfaced as `retry_after` on denial —
    /// a duration, not the absolute `reset` timestamp.
    pub window_secs: u64,
}

pub struct RateLimiter {
    kv: Option<Arc<dyn KvStore>>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(kv: Option<Arc<dyn KvStore>>) -> Self {
        RateLimiter {
            kv,
            window: DEFAULT_WINDOW,
        }
    }

    #[cfg(test)]
    pub fn with_window(kv: Option<Arc<dyn KvStore>>, window: Duration) -> Self {
        RateLimiter { kv, window }
    }

    /// Checks and records one arrival for `identity`, per the four-step
    /// algorithm of spec.md §4.4. On any KV error, fails open: the request
    /// is admitted with `remaining = limit` (spec.md §4.4, §8 invariant 7).
    pub async fn check(&self, identity: &ClientIdentity) -> RateLimitDecision {
        let limit = identity.tier.default_limit();
        let now = SystemTime::now();
        let now_secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let reset = now_secs + self.window.as_secs();

        let Some(kv) = &self.kv else {
            return self.fail_open(identity.tier, limit, reset);
        };

        let now_nanos = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        let key = format!("rate_limit:{}", identity.rate_limit_subject());

        match kv.sliding_window_increment(&key, now_nanos, self.window).await {
            Ok(window) => {
                let n = window.count_before_insert;
                // Admission per spec.md §8 invariant 2: `allowed := n <= limit`,
                // preserved verbatim including its documented off-by-one
                // boundary at exactly `n == limit`.
                let allowed = n <= limit;
                let remaining = limit.saturating_sub(n);
                RateLimitDecision {
                    allowed,
                    tier: identity.tier,
                    limit,
                    remaining,
                    reset,
                    window_secs: self.window.as_secs(),
                }
            }
            Err(err) => {
                log::warn!(target: "gateway::rate_limiter", "kv error, failing open: {err}");
                self.fail_open(identity.tier, limit, reset)
            }
        }
    }

    fn fail_open(&self, tier: Tier, limit: u64, reset: u64) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            tier,
            limit,
            remaining: limit,
            reset,
            window_secs: self.window.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::kv::{KvError, WindowCount};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// In-memory double implementing `KvStore`, used to exercise the
    /// sliding-window arithmetic without a live Redis server.
    struct FakeKv {
        arrivals: Mutex<HashMap<String, Vec<u64>>>,
        fail: AtomicU64,
    }

    impl FakeKv {
        fn new() -> Self {
            FakeKv {
                arrivals: Mutex::new(HashMap::new()),
                fail: AtomicU64::new(0),
            }
        }

        fn failing() -> Self {
            FakeKv {
                arrivals: Mutex::new(HashMap::new()),
                fail: AtomicU64::new(1),
            }
        }
    }

    #[async_trait::async_trait]
    impl KvStore for FakeKv {
        async fn sliding_window_increment(
            &self,
            key: &str,
            now_nanos: u64,
            window: Duration,
        ) -> Result<WindowCount, KvError> {
            if self.fail.load(Ordering::Acquire) == 1 {
                return Err(KvError::Unreachable("simulated outage".into()));
            }
            let mut store = self.arrivals.lock().unwrap();
            let arrivals = store.entry(key.to_string()).or_default();
            let floor = now_nanos.saturating_sub(window.as_nanos() as u64);
            arrivals.retain(|&t| t >= floor);
            let count_before_insert = arrivals.len() as u64;
            arrivals.push(now_nanos);
            Ok(WindowCount { count_before_insert })
        }

        async fn ping(&self) -> bool {
            self.fail.load(Ordering::Acquire) == 0
        }
    }

    fn anon_identity(ip: &str) -> ClientIdentity {
        ClientIdentity::anonymous(ip)
    }

    #[tokio::test]
    async fn admits_within_limit() {
        let limiter = RateLimiter::new(Some(Arc::new(FakeKv::new())));
        let identity = anon_identity("1.2.3.4");
        let decision = limiter.check(&identity).await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 100);
        assert_eq!(decision.remaining, 100);
    }

    #[tokio::test]
    async fn denies_past_limit() {
        let kv = Arc::new(FakeKv::new());
        let limiter = RateLimiter::new(Some(kv));
        let identity = anon_identity("1.2.3.4");
        let mut last = limiter.check(&identity).await;
        for _ in 0..101 {
            last = limiter.check(&identity).await;
        }
        assert!(!last.allowed);
        assert_eq!(last.remaining, 0);
    }

    #[tokio::test]
    async fn fails_open_on_kv_error() {
        let limiter = RateLimiter::new(Some(Arc::new(FakeKv::failing())));
        let identity = anon_identity("1.2.3.4");
        let decision = limiter.check(&identity).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, decision.limit);
    }

    #[tokio::test]
    async fn fails_open_when_kv_disabled() {
        let limiter = RateLimiter::new(None);
        let identity = anon_identity("1.2.3.4");
        let decision = limiter.check(&identity).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, decision.limit);
    }

    #[tokio::test]
    async fn different_subjects_have_independent_windows() {
        let kv = Arc::new(FakeKv::new());
        let limiter = RateLimiter::new(Some(kv));
        let a = anon_identity("1.1.1.1");
        let b = anon_identity("2.2.2.2");
        for _ in 0..50 {
            limiter.check(&a).await;
        }
        let decision_b = limiter.check(&b).await;
        assert_eq!(decision_b.remaining, 100);
    }
}
