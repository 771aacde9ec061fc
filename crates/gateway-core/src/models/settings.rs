//! Gateway configuration, loaded once at startup from environment
//! variables (spec.md §6).

use std::env;

/// `GATEWAY_MODE`: affects the `/graphql` GET playground (dev-only) and log
/// verbosity defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Debug,
    Release,
}

impl GatewayMode {
    fn from_env_value(v: &str) -> GatewayMode {
        match v.to_ascii_lowercase().as_str() {
            "release" => GatewayMode::Release,
            _ => GatewayMode::Debug,
        }
    }

    pub fn is_release(&self) -> bool {
        matches!(self, GatewayMode::Release)
    }
}

/// Base URLs for each fixed backend's instances. A single `*_SERVICE_URL`
/// env var may carry a comma-separated list modeling multiple replicas.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    pub auth: Vec<String>,
    pub work: Vec<String>,
    pub tag: Vec<String>,
    pub search: Vec<String>,
}

fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct KvSettings {
    pub url: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub allow_all: bool,
    pub wildcard: bool,
    pub frontend_url: Option<String>,
}

/// Reuses the teacher's `JwtSettings` shape: the gateway validates bearer
/// tokens itself for tier/identity derivation even though the auth service
/// is the token-issuing authority.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub required_claims: Vec<String>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        JwtSettings {
            secret: env::var("JWT_SECRET").unwrap_or_default(),
            issuer: None,
            audience: None,
            required_claims: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub mode: GatewayMode,
    pub services: ServiceRegistry,
    pub kv: KvSettings,
    pub cors: CorsSettings,
    pub jwt: JwtSettings,
}

impl Settings {
    /// Loads configuration from the process environment, per spec.md §6's
    /// variable table. Never fails on its own — missing values fall back to
    /// documented defaults or empty collections; fatal misconfiguration is
    /// caught by `config::validation::validate`.
    pub fn from_env() -> Settings {
        let port = env::var("GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let mode = env::var("GATEWAY_MODE")
            .map(|v| GatewayMode::from_env_value(&v))
            .unwrap_or(GatewayMode::Debug);

        let services = ServiceRegistry {
            auth: env::var("AUTH_SERVICE_URL").map(|v| split_urls(&v)).unwrap_or_default(),
            work: env::var("WORK_SERVICE_URL").map(|v| split_urls(&v)).unwrap_or_default(),
            tag: env::var("TAG_SERVICE_URL").map(|v| split_urls(&v)).unwrap_or_default(),
            search: env::var("SEARCH_SERVICE_URL").map(|v| split_urls(&v)).unwrap_or_default(),
        };

        let kv = KvSettings {
            url: env::var("KV_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            password: env::var("KV_PASSWORD").ok().filter(|s| !s.is_empty()),
        };

        let cors = CorsSettings {
            allow_all: env::var("CORS_ALLOW_ALL").map(|v| v == "true").unwrap_or(false),
            wildcard: env::var("CORS_WILDCARD").map(|v| v == "true").unwrap_or(false),
            frontend_url: env::var("FRONTEND_URL").ok().filter(|s| !s.is_empty()),
        };

        Settings {
            port,
            mode,
            services,
            kv,
            cors,
            jwt: JwtSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_urls_trims_and_drops_empties() {
        assert_eq!(
            split_urls(" http://a:1 , http://b:2,"),
            vec!["http://a:1".to_string(), "http://b:2".to_string()]
        );
    }

    #[test]
    fn gateway_mode_defaults_to_debug() {
        assert_eq!(GatewayMode::from_env_value("nonsense"), GatewayMode::Debug);
        assert_eq!(GatewayMode::from_env_value("release"), GatewayMode::Release);
    }
}
