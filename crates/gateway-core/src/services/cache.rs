//! Static-asset-only response cache.
//!
//! No API response is ever cached — this is a security invariant (spec.md
//! §4.5): authenticated per-user data must never flow through the shared
//! cache. Backed by `moka`'s async cache for the in-process TTL'd store.

use std::time::Duration;

use moka::future::Cache;

const TTL: Duration = Duration::from_secs(3600);
const STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot", ".map",
];
const STATIC_PREFIXES: &[&str] = &["/static/", "/assets/", "/public/"];

/// True iff `path` matches the static-asset predicate of spec.md §4.5.
/// Method is not considered here — callers must also check for GET.
pub fn is_static_asset(path: &str) -> bool {
    STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || STATIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Derives the cache key from `("proxy", service, path, raw_query)`,
/// joined into a single string key per spec.md §3.
pub fn cache_key(service: &str, path: &str, raw_query: &str) -> String {
    format!("proxy:{service}:{path}?{raw_query}")
}

pub struct ResponseCache {
    inner: Cache<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        let inner = Cache::builder().time_to_live(TTL).build();
        ResponseCache { inner }
    }

    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.get(key).await
    }

    /// Only called for GET requests whose path satisfies `is_static_asset`
    /// and whose upstream response was 2xx — enforced by the caller
    /// (`services::proxy`), not by this type, since the cache itself has no
    /// knowledge of the request that produced an entry.
    pub async fn put(&self, key: String, entry: CacheEntry) {
        self.inner.insert(key, entry).await;
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
