//! Bearer-token authentication middleware.
//!
//! Grounded on the teacher's `middleware/auth.rs` `JwtAuth`/`JwtAuthMiddleware`
//! pair (a `Transform`/`Service` returning `BoxBody`), extended to derive a
//! full `ClientIdentity` (tier + scopes) from the token claims rather than
//! just pass/fail, and to support the spec's optional-auth prefixes (valid
//! token → authenticated identity, missing/invalid token → anonymous,
//! distinct from the protected prefixes where an invalid token is a hard
//! 401).

use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::body::BoxBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage, HttpResponse};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::models::identity::{ClientIdentity, Tier};
use crate::models::settings::JwtSettings;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub iss: Option<String>,
    pub aud: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

fn tier_from_claim(value: Option<&str>) -> Tier {
    match value {
        Some("trusted") => Tier::Trusted,
        Some("first_party") => Tier::FirstParty,
        Some("admin") => Tier::Admin,
        _ => Tier::Public,
    }
}

/// Extracts the bearer token from an `Authorization` header value, if
/// present and well-formed.
pub fn extract_bearer_token(header_value: Option<&str>) -> Option<&str> {
    header_value?.strip_prefix("Bearer ").map(str::trim)
}

/// Validates `token` against `settings`, returning the derived identity.
/// `peer_ip` is used for the anonymous fallback and is otherwise unused by
/// an authenticated identity.
pub fn validate_token(token: &str, settings: &JwtSettings, peer_ip: &str) -> Result<ClientIdentity, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(aud) = &settings.audience {
        validation.set_audience(&[aud]);
    } else {
        validation.validate_aud = false;
    }
    if let Some(iss) = &settings.issuer {
        validation.set_issuer(&[iss]);
    }

    let decoded = decode::<Claims>(token, &DecodingKey::from_secret(settings.secret.as_bytes()), &validation)?;
    let claims = decoded.claims;

    for required in &settings.required_claims {
        let present = match required.as_str() {
            "sub" => !claims.sub.is_empty(),
            "iss" => claims.iss.is_some(),
            "aud" => claims.aud.is_some(),
            _ => claims.scopes.iter().any(|s| s == required),
        };
        if !present {
            return Err(jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(required.clone()).into());
        }
    }

    Ok(ClientIdentity::authenticated(
        tier_from_claim(claims.tier.as_deref()),
        claims.sub.clone(),
        Some(claims.sub),
        claims.scopes,
        peer_ip,
    ))
}

fn peer_ip(req: &ServiceRequest) -> String {
    req.connection_info().peer_addr().unwrap_or("unknown").to_string()
}

/// Installs the derived `ClientIdentity` into the request's extensions so
/// downstream handlers (rate limiting, the proxy pipeline) can read it
/// without re-parsing the token.
fn install_identity(req: &ServiceRequest, identity: ClientIdentity) {
    req.extensions_mut().insert(identity);
}

/// Middleware factory. `required = true` enforces a valid token (401 on
/// missing/invalid, per the protected prefixes of spec.md §6); `required =
/// false` degrades to the anonymous identity instead (the optional-auth
/// prefixes).
pub struct JwtAuth {
    settings: Rc<JwtSettings>,
    required: bool,
}

impl JwtAuth {
    pub fn required(settings: JwtSettings) -> Self {
        JwtAuth {
            settings: Rc::new(settings),
            required: true,
        }
    }

    pub fn optional(settings: JwtSettings) -> Self {
        JwtAuth {
            settings: Rc::new(settings),
            required: false,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = JwtAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            settings: self.settings.clone(),
            required: self.required,
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    settings: Rc<JwtSettings>,
    required: bool,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let settings = self.settings.clone();
        let required = self.required;
        let ip = peer_ip(&req);

        let auth_header = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Box::pin(async move {
            let token = extract_bearer_token(auth_header.as_deref());

            let identity = match token {
                Some(token) => match validate_token(token, &settings, &ip) {
                    Ok(identity) => Some(identity),
                    Err(_) if !required => None,
                    Err(_) => {
                        let response = HttpResponse::Unauthorized()
                            .json(serde_json::json!({ "error": "authentication required" }));
                        return Ok(req.into_response(response).map_into_boxed_body());
                    }
                },
                None if required => {
                    let response =
                        HttpResponse::Unauthorized().json(serde_json::json!({ "error": "authentication required" }));
                    return Ok(req.into_response(response).map_into_boxed_body());
                }
                None => None,
            };

            install_identity(&req, identity.unwrap_or_else(|| ClientIdentity::anonymous(ip)));

            let response = service.call(req).await?;
            Ok(response.map_into_boxed_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str) -> JwtSettings {
        JwtSettings {
            secret: secret.to_string(),
            issuer: None,
            audience: None,
            required_claims: vec![],
        }
    }

    fn make_token(secret: &str, scopes: Vec<String>) -> String {
        let claims = Claims {
            sub: "user-1".into(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
            iat: chrono::Utc::now().timestamp() as usize,
            iss: None,
            aud: None,
            scopes,
            tier: Some("trusted".into()),
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn extract_bearer_token_strips_prefix() {
        assert_eq!(extract_bearer_token(Some("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer_token(Some("Basic abc")), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn validate_token_derives_tier_and_scopes() {
        let s = settings("a-sufficiently-long-secret-value");
        let token = make_token(&s.secret, vec!["works:read".into()]);
        let identity = validate_token(&token, &s, "1.2.3.4").unwrap();
        assert_eq!(identity.tier, Tier::Trusted);
        assert_eq!(identity.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn validate_token_admin_scope_forces_admin_tier() {
        let s = settings("a-sufficiently-long-secret-value");
        let token = make_token(&s.secret, vec!["admin".into()]);
        let identity = validate_token(&token, &s, "1.2.3.4").unwrap();
        assert_eq!(identity.tier, Tier::Admin);
    }

    #[test]
    fn validate_token_rejects_wrong_secret() {
        let s = settings("a-sufficiently-long-secret-value");
        let token = make_token("a-totally-different-secret-value", vec![]);
        assert!(validate_token(&token, &s, "1.2.3.4").is_err());
    }
}
