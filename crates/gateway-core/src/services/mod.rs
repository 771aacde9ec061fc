//! Gateway services: the non-HTTP-framework-facing business logic.

pub mod cache;
pub mod circuit_breaker;
pub mod health;
pub mod kv;
pub mod metrics;
pub mod proxy;
pub mod rate_limiter;
pub mod selector;

pub use cache::ResponseCache;
pub use circuit_breaker::CircuitBreaker;
pub use health::HealthTracker;
pub use kv::{KvStore, RedisKvStore};
pub use metrics::MetricsCollector;
pub use rate_limiter::RateLimiter;
