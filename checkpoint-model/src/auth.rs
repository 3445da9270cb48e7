use serde::{Deserialize, Serialize};

/// Unauthenticated login body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Email or document number of the guard.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair issued by login and refresh.
///
/// The registry names the lifetime field `expiresAt` but sends a relative
/// number of seconds, so both spellings are accepted.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(alias = "expiresAt")]
    pub expires_in: i64,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_accepts_registry_field_names() {
        let grant: TokenGrant = serde_json::from_str(
            r#"{"accessToken":"a","refreshToken":"r","expiresAt":900}"#,
        )
        .unwrap();
        assert_eq!(grant.expires_in, 900);

        let grant: TokenGrant = serde_json::from_str(
            r#"{"accessToken":"a","refreshToken":"r","expiresIn":60}"#,
        )
        .unwrap();
        assert_eq!(grant.expires_in, 60);
    }

    #[test]
    fn debug_hides_tokens() {
        let grant = TokenGrant {
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
            expires_in: 1,
        };
        let rendered = format!("{grant:?}");
        assert!(!rendered.contains("secret"));
    }
}
