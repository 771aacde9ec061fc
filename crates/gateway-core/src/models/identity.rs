//! Client identity and tier classification.

use serde::{Deserialize, Serialize};

/// Client trust class, in ascending order of rate-limit budget.
///
/// `Ord`/`PartialOrd` are derived from declaration order, so
/// `Tier::Anonymous < Tier::Admin` holds via the derive — callers should
/// never hand-roll this comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Anonymous,
    Public,
    Trusted,
    FirstParty,
    Admin,
}

impl Tier {
    /// Default requests-per-window budget for this tier (spec.md §4.4).
    pub fn default_limit(&self) -> u64 {
        match self {
            Tier::Anonymous => 100,
            Tier::Public => 1_000,
            Tier::Trusted => 5_000,
            Tier::FirstParty => 10_000,
            Tier::Admin => 50_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Public => "public",
            Tier::Trusted => "trusted",
            Tier::FirstParty => "first_party",
            Tier::Admin => "admin",
        }
    }
}

/// Scopes that force `Tier::Admin` regardless of the client's nominal class.
const ADMIN_SCOPES: &[&str] = &["admin", "tags:wrangle", "moderation"];

/// Identity derived from the bearer token (if any) plus the peer address.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub tier: Tier,
    pub client_id: String,
    pub user_id: Option<String>,
    pub scopes: Vec<String>,
    pub ip: String,
}

impl ClientIdentity {
    /// Builds the anonymous identity for a given peer IP.
    pub fn anonymous(ip: impl Into<String>) -> Self {
        ClientIdentity {
            tier: Tier::Anonymous,
            client_id: String::new(),
            user_id: None,
            scopes: Vec::new(),
            ip: ip.into(),
        }
    }

    /// Builds an authenticated identity, promoting to `Admin` if any scope
    /// in `scopes` is an admin scope, per spec.md §3.
    pub fn authenticated(
        base_tier: Tier,
        client_id: impl Into<String>,
        user_id: Option<String>,
        scopes: Vec<String>,
        ip: impl Into<String>,
    ) -> Self {
        let tier = if scopes.iter().any(|s| ADMIN_SCOPES.contains(&s.as_str())) {
            Tier::Admin
        } else {
            base_tier
        };
        ClientIdentity {
            tier,
            client_id: client_id.into(),
            user_id,
            scopes,
            ip: ip.into(),
        }
    }

    /// The rate-limit subject key, per spec.md §4.4's subject-selection rule.
    pub fn rate_limit_subject(&self) -> String {
        match self.tier {
            Tier::Anonymous => format!("anon:{}", self.ip),
            Tier::Admin => match &self.user_id {
                Some(uid) => format!("admin:user:{uid}"),
                None => format!("admin:{}", self.client_id),
            },
            other => format!("{}:{}", other.as_str(), self.client_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_is_strict() {
        assert!(Tier::Anonymous < Tier::Public);
        assert!(Tier::Public < Tier::Trusted);
        assert!(Tier::Trusted < Tier::FirstParty);
        assert!(Tier::FirstParty < Tier::Admin);
    }

    #[test]
    fn admin_scope_forces_admin_tier() {
        let id = ClientIdentity::authenticated(
            Tier::Public,
            "client-1",
            Some("user-1".into()),
            vec!["moderation".into()],
            "1.2.3.4",
        );
        assert_eq!(id.tier, Tier::Admin);
    }

    #[test]
    fn anonymous_subject_is_keyed_by_ip() {
        let id = ClientIdentity::anonymous("9.9.9.9");
        assert_eq!(id.rate_limit_subject(), "anon:9.9.9.9");
    }

    #[test]
    fn admin_subject_prefers_user_id() {
        let id = ClientIdentity::authenticated(
            Tier::Admin,
            "client-1",
            Some("user-42".into()),
            vec!["admin".into()],
            "1.2.3.4",
        );
        assert_eq!(id.rate_limit_subject(), "admin:user:user-42");
    }

    #[test]
    fn admin_subject_falls_back_to_client_id() {
        let id = ClientIdentity::authenticated(
            Tier::Admin,
            "client-9",
            None,
            vec!["admin".into()],
            "1.2.3.4",
        );
        assert_eq!(id.rate_limit_subject(), "admin:client-9");
    }
}
