use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Longest lifetime honoured from a grant (ten years).
pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Access/refresh pair with its absolute expiry. Always replaced whole.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn issue(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let lifetime = expires_in_secs.clamp(0, MAX_LIFETIME_SECS);
        if lifetime != expires_in_secs {
            warn!(expires_in_secs, lifetime, "grant lifetime out of range, clamped");
        }
        let expires_at = TimeDelta::try_seconds(lifetime)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(now);
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        Some(self.refresh_token.as_str()).filter(|token| !token.trim().is_empty())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at > now
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &token_prefix(&self.access_token))
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// First characters of a token, safe for logs.
pub fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_must_be_strictly_in_the_future() {
        let now = Utc::now();
        let credential = Credential::issue("a", "r", 60, now);
        assert!(credential.is_valid_at(now));
        assert!(!credential.is_valid_at(now + TimeDelta::seconds(60)));
    }

    #[test]
    fn blank_refresh_token_is_absent() {
        let credential = Credential::issue("a", " ", 60, Utc::now());
        assert_eq!(credential.refresh_token(), None);
    }

    #[test]
    fn extreme_lifetimes_are_clamped() {
        let now = Utc::now();
        let forever = Credential::issue("a", "r", i64::MAX, now);
        assert!(forever.is_valid_at(now));
        assert_eq!(
            forever.expires_at(),
            now + TimeDelta::seconds(MAX_LIFETIME_SECS)
        );

        let past = Credential::issue("a", "r", i64::MIN, now);
        assert_eq!(past.expires_at(), now);
        assert!(!past.is_valid_at(now));
    }
}
