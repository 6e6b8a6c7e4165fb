//! Identity token returned by a successful login.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

/// A signed identity token (JWT) issued by the provider.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Wrap a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw token.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Decode the payload without verifying the signature.
    ///
    /// Only for display; the token is verified by whoever consumes it.
    pub fn claims(&self) -> Option<TokenClaims> {
        let payload = self.0.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityToken(<redacted>)")
    }
}

/// Standard claims of interest in an identity token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience; a string or a list.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Expiry (Unix seconds).
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issued-at (Unix seconds).
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenClaims {
    /// Whether the token expired before `now` (Unix seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> IdentityToken {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload);
        IdentityToken::new(format!("{}.{}.c2lnbmF0dXJl", header, body))
    }

    #[test]
    fn test_claims() {
        let token = jwt(r#"{"sub":"entity-123","iss":"https://vault/v1/identity/oidc/provider/gateplane","aud":"abc","exp":1700000000,"iat":1699996400}"#);
        let claims = token.claims().unwrap();
        assert_eq!(claims.sub.as_deref(), Some("entity-123"));
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert!(claims.is_expired_at(1_700_000_000));
        assert!(!claims.is_expired_at(1_699_999_999));
    }

    #[test]
    fn test_claims_of_opaque_token() {
        assert!(IdentityToken::new("eyXYZ").claims().is_none());
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = IdentityToken::new("eyJ.secret.sig");
        assert_eq!(format!("{:?}", token), "IdentityToken(<redacted>)");
        assert_eq!(token.as_str(), "eyJ.secret.sig");
    }
}
