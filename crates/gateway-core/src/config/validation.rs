//! Startup configuration validation, mirroring the teacher's
//! `Settings::validate` / `ConfigValidator` split: hard failures abort
//! startup, soft issues are returned as warnings and logged but do not
//! prevent the gateway from serving traffic.

use crate::models::settings::Settings;

const DEFAULT_JWT_SECRETS: &[&str] = &["changeme", "secret", "default"];

/// Validates `settings`, returning accumulated warnings on success or
/// accumulated fatal errors on failure. Fatal errors are, per spec.md §4.9,
/// the only thing expected to `std::process::exit(1)` the gateway.
pub fn validate(settings: &Settings) -> Result<Vec<String>, Vec<String>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if settings.port == 0 {
        errors.push("GATEWAY_PORT must not be 0".to_string());
    }

    if settings.jwt.secret.trim().is_empty() {
        errors.push("JWT_SECRET must be set".to_string());
    } else if settings.jwt.secret.len() < 16 {
        errors.push("JWT_SECRET must be at least 16 characters".to_string());
    } else if DEFAULT_JWT_SECRETS.contains(&settings.jwt.secret.as_str()) {
        errors.push("JWT_SECRET must not be a default placeholder value".to_string());
    }

    for (name, urls) in [
        ("AUTH_SERVICE_URL", &settings.services.auth),
        ("WORK_SERVICE_URL", &settings.services.work),
        ("TAG_SERVICE_URL", &settings.services.tag),
        ("SEARCH_SERVICE_URL", &settings.services.search),
    ] {
        if urls.is_empty() {
            warnings.push(format!("{name} is unset; that service has no instances"));
        }
        for url in urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!("{name} entry '{url}' is not a valid http(s) URL"));
            }
        }
    }

    if settings.kv.url.trim().is_empty() {
        warnings.push("KV_URL is unset; rate limiting and caching run with the store disabled".to_string());
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::{CorsSettings, JwtSettings, KvSettings, ServiceRegistry};

    fn base_settings(secret: &str) -> Settings {
        Settings {
            port: 8080,
            mode: crate::models::settings::GatewayMode::Debug,
            services: ServiceRegistry {
                auth: vec!["http://auth:8081".into()],
                work: vec!["http://work:8082".into()],
                tag: vec!["http://tag:8083".into()],
                search: vec!["http://search:8084".into()],
            },
            kv: KvSettings {
                url: "redis://127.0.0.1:6379".into(),
                password: None,
            },
            cors: CorsSettings {
                allow_all: false,
                wildcard: false,
                frontend_url: None,
            },
            jwt: JwtSettings {
                secret: secret.to_string(),
                issuer: None,
                audience: None,
                required_claims: Vec::new(),
            },
        }
    }

    #[test]
    fn valid_settings_pass() {
        let s = base_settings("a-sufficiently-long-secret");
        assert!(validate(&s).is_ok());
    }

    #[test]
    fn empty_secret_is_fatal() {
        let s = base_settings("");
        assert!(validate(&s).is_err());
    }

    #[test]
    fn default_placeholder_secret_is_fatal() {
        let s = base_settings("changemechangeme");
        assert!(validate(&s).is_err());
    }

    #[test]
    fn zero_port_is_fatal() {
        let mut s = base_settings("a-sufficiently-long-secret");
        s.port = 0;
        assert!(validate(&s).is_err());
    }

    #[test]
    fn missing_service_instances_is_a_warning_not_an_error() {
        let mut s = base_settings("a-sufficiently-long-secret");
        s.services.search = Vec::new();
        let result = validate(&s).expect("should not be fatal");
        assert!(result.iter().any(|w| w.contains("SEARCH_SERVICE_URL")));
    }
}
