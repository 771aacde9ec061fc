//! KV Client Adapter: pipelined access to the shared ordered-set store that
//! backs the rate limiter.
//!
//! The `KvStore` trait is the seam the teacher's tests use for the load
//! balancer and circuit breaker ("fake over trait"): the rate limiter is
//! built against the trait, so its admission arithmetic can be unit tested
//! without a live Redis server, while `RedisKvStore` is the production
//! adapter.

use std::time::Duration;

/// Result of the four-step sliding-window pipeline (spec.md §4.4): the
/// cardinality of the ordered set observed *before* this arrival was
/// inserted.
pub struct WindowCount {
    pub count_before_insert: u64,
}

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Executes, atomically against `key`, the four steps of spec.md §4.4:
    /// trim entries older than `now - window`, read the cardinality,
    /// insert `now`, and set the key's TTL to `window`.
    async fn sliding_window_increment(
        &self,
        key: &str,
        now_nanos: u64,
        window: Duration,
    ) -> Result<WindowCount, KvError>;

    /// Checks whether the store is currently reachable, used by `/status`.
    async fn ping(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv store unreachable: {0}")]
    Unreachable(String),
    #[error("kv store command failed: {0}")]
    Command(String),
}

/// Production adapter over a Redis-compatible ordered-set store, pipelined
/// with `redis::pipe().atomic()` per spec.md §4.4 and §5's "atomic pipeline
/// execution" requirement.
pub struct RedisKvStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisKvStore {
    /// Dials the store with a 5s timeout, per spec.md §4.9's startup
    /// contract. Returns `Err` if unreachable; the caller is expected to
    /// continue with rate limiting/caching disabled rather than abort
    /// startup (spec.md §7's propagation policy).
    pub async fn connect(url: &str, password: Option<&str>) -> Result<Self, KvError> {
        let mut connection_url = url.to_string();
        if let Some(password) = password {
            if !password.is_empty() {
                connection_url = apply_password(&connection_url, password);
            }
        }
        let client = redis::Client::open(connection_url).map_err(|e| KvError::Unreachable(e.to_string()))?;
        let manager = tokio::time::timeout(Duration::from_secs(5), client.get_connection_manager())
            .await
            .map_err(|_| KvError::Unreachable("connection timed out".into()))?
            .map_err(|e| KvError::Unreachable(e.to_string()))?;
        Ok(RedisKvStore { manager })
    }
}

fn apply_password(url: &str, password: &str) -> String {
    if url.contains('@') {
        return url.to_string();
    }
    url.replacen("://", &format!("://:{password}@"), 1)
}

#[async_trait::async_trait]
impl KvStore for RedisKvStore {
    async fn sliding_window_increment(
        &self,
        key: &str,
        now_nanos: u64,
        window: Duration,
    ) -> Result<WindowCount, KvError> {
        let window_nanos = window.as_nanos() as u64;
        let floor = now_nanos.saturating_sub(window_nanos);
        let ttl_secs = window.as_secs().max(1);

        let mut conn = self.manager.clone();
        let (_removed, count_before_insert, _inserted, _expired): (i64, u64, i64, bool) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(0)
            .arg(floor)
            .cmd("ZCARD")
            .arg(key)
            .cmd("ZADD")
            .arg(key)
            .arg(now_nanos)
            .arg(now_nanos)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::Command(e.to_string()))?;

        Ok(WindowCount { count_before_insert })
    }

    async fn ping(&self) -> bool {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_password_injects_userinfo() {
        assert_eq!(
            apply_password("redis://127.0.0.1:6379", "secret"),
            "redis://:secret@127.0.0.1:6379"
        );
    }

    #[test]
    fn apply_password_is_noop_when_userinfo_present() {
        assert_eq!(
            apply_password("redis://user:pw@127.0.0.1:6379", "secret"),
            "redis://user:pw@127.0.0.1:6379"
        );
    }
}
