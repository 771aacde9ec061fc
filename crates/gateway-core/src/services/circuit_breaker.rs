//! Per-instance circuit breaker state machine.
//!
//! Three states (`Closed`/`Open`/`HalfOpen`) tracked with atomics so the
//! hot path never takes a lock across an `.await`. `opened_at` is the one
//! field that needs interior mutability beyond a single atomic; it is read
//! from both the synchronous admissibility check (`Instance::is_admissible`)
//! and the async `call` path, so it lives behind a plain `std::sync::RwLock`
//! rather than `tokio::sync::RwLock` — the critical section is a single
//! `Option<Instant>` read/write and is never held across an await point.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

const FAILURE_THRESHOLD: u64 = 5;
const RESET_TIMEOUT: Duration = Duration::from_secs(30);

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for CircuitState {
    fn from(v: u8) -> Self {
        match v {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

enum Admission {
    Admitted { was_half_open_probe: bool },
    Rejected,
}

struct HalfOpenGuard<'a> {
    breaker: &'a CircuitBreaker,
    is_half_open_probe: bool,
    completed: bool,
}

impl<'a> HalfOpenGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, is_half_open_probe: bool) -> Self {
        HalfOpenGuard {
            breaker,
            is_half_open_probe,
            completed: false,
        }
    }
}

impl Drop for HalfOpenGuard<'_> {
    fn drop(&mut self) {
        if self.is_half_open_probe && !self.completed {
            log::warn!(target: "gateway::circuit_breaker", "{} half-open probe cancelled, releasing slot", self.breaker.name);
            self.breaker.half_open_admitted.store(false, Ordering::Release);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker open")]
    CircuitOpen,
    #[error(transparent)]
    OperationFailed(E),
}

/// Per-instance breaker. `name` is the instance's `base_url`, used only for
/// logging.
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    failure_count: AtomicU64,
    opened_at: RwLock<Option<Instant>>,
    /// Set while a single half-open probe is in flight; any concurrent
    /// request in HalfOpen is rejected until this clears, per spec.md §4.2's
    /// "admit at most one in flight" half-open rule.
    half_open_admitted: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        CircuitBreaker {
            name: name.into(),
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicU64::new(0),
            opened_at: RwLock::new(None),
            half_open_admitted: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Read-only admissibility check for the selector (spec.md §4.3): true
    /// iff a request issued right now would be rejected without attempting
    /// an upstream call. Does not mutate state — the boundary transition to
    /// `HalfOpen` only happens inside `call`.
    pub fn is_open_now(&self) -> bool {
        match self.state() {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => self.half_open_admitted.load(Ordering::Acquire),
            CircuitState::Open => {
                let opened_at = *self.opened_at.read().unwrap();
                match opened_at {
                    Some(t) => t.elapsed() < RESET_TIMEOUT,
                    None => true,
                }
            }
        }
    }

    /// Runs `operation` through the breaker, admitting or rejecting per the
    /// state machine in spec.md §4.2.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let was_half_open_probe = match self.admit() {
            Admission::Rejected => return Err(CircuitBreakerError::CircuitOpen),
            Admission::Admitted { was_half_open_probe } => was_half_open_probe,
        };
        // If the caller's future is dropped before completion (client
        // cancellation), this guard still clears the half-open slot so the
        // breaker doesn't wedge itself waiting for a probe that will never
        // report back. A cancelled probe deliberately does not count as a
        // breaker failure.
        let mut guard = HalfOpenGuard::new(self, was_half_open_probe);
        let outcome = operation().await;
        guard.completed = true;
        match outcome {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitBreakerError::OperationFailed(e))
            }
        }
    }

    /// Evaluates and, if needed, mutates the state machine to decide whether
    /// this request is admitted.
    fn admit(&self) -> Admission {
        loop {
            match self.state() {
                CircuitState::Closed => return Admission::Admitted { was_half_open_probe: false },
                CircuitState::HalfOpen => {
                    return if self
                        .half_open_admitted
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        Admission::Admitted { was_half_open_probe: true }
                    } else {
                        Admission::Rejected
                    };
                }
                CircuitState::Open => {
                    let elapsed = self
                        .opened_at
                        .read()
                        .unwrap()
                        .map(|t| t.elapsed() >= RESET_TIMEOUT)
                        .unwrap_or(true);
                    if !elapsed {
                        return Admission::Rejected;
                    }
                    if self
                        .state
                        .compare_exchange(
                            STATE_OPEN,
                            STATE_HALF_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        log::info!(target: "gateway::circuit_breaker", "{} half-open probe admitted", self.name);
                        self.half_open_admitted.store(true, Ordering::Release);
                        return Admission::Admitted { was_half_open_probe: true };
                    }
                    // Lost the race to another thread's transition; re-check.
                }
            }
        }
    }

    fn on_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.transition_to_closed();
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.transition_to_open();
            }
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= FAILURE_THRESHOLD {
                    self.transition_to_open();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_open(&self) {
        *self.opened_at.write().unwrap() = Some(Instant::now());
        self.half_open_admitted.store(false, Ordering::Release);
        self.state.store(STATE_OPEN, Ordering::Release);
        log::warn!(target: "gateway::circuit_breaker", "{} -> Open", self.name);
    }

    fn transition_to_closed(&self) {
        self.failure_count.store(0, Ordering::Release);
        self.half_open_admitted.store(false, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
        log::info!(target: "gateway::circuit_breaker", "{} -> Closed", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok() -> Result<(), &'static str> {
        Ok(())
    }

    async fn fail() -> Result<(), &'static str> {
        Err("boom")
    }

    #[tokio::test]
    async fn opens_after_five_consecutive_failures() {
        let cb = CircuitBreaker::new("test");
        for _ in 0..4 {
            let _ = cb.call(|| fail()).await;
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        let _ = cb.call(|| fail()).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_rejects_without_calling_operation() {
        let cb = CircuitBreaker::new("test");
        for _ in 0..5 {
            let _ = cb.call(|| fail()).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
        let result = cb.call(|| ok()).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
        assert!(cb.is_open_now());
    }

    #[tokio::test]
    async fn half_open_success_closes_and_resets_failure_count() {
        let cb = CircuitBreaker::new("test");
        for _ in 0..5 {
            let _ = cb.call(|| fail()).await;
        }
        *cb.opened_at.write().unwrap() = Some(Instant::now() - Duration::from_secs(31));
        let result = cb.call(|| ok()).await;
        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test");
        for _ in 0..5 {
            let _ = cb.call(|| fail()).await;
        }
        *cb.opened_at.write().unwrap() = Some(Instant::now() - Duration::from_secs(31));
        let result = cb.call(|| fail()).await;
        assert!(result.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn success_in_closed_resets_failure_count() {
        let cb = CircuitBreaker::new("test");
        let _ = cb.call(|| fail()).await;
        let _ = cb.call(|| ok()).await;
        assert_eq!(cb.failure_count.load(Ordering::Acquire), 0);
    }
}
