//! Caller identity verification.
//!
//! User requests carry a Firebase ID token; push deliveries carry a Google
//! OIDC token signed for the consume endpoint. Both are RS256 JWTs checked
//! against Google's published keys.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;

const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const GOOGLE_OIDC_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const JWKS_CACHE_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub issuer: String,
    pub email: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("Key fetch failed: {0}")]
    KeyFetch(String),
}

/// Which kind of token a verifier accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Firebase Auth ID token. Audience is the project id.
    FirebaseUser,
    /// Google-signed OIDC token from push delivery. Audience is the endpoint URL.
    GoogleOidc,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token` and return its subject. Any of `audiences` is accepted.
    async fn verify_token(
        &self,
        token: &str,
        audiences: &[String],
    ) -> Result<VerifiedIdentity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: DateTime<Utc>,
}

pub struct GoogleTokenVerifier {
    http: reqwest::Client,
    kind: TokenKind,
    project_id: String,
    keys: RwLock<Option<CachedKeys>>,
}

impl GoogleTokenVerifier {
    pub fn new(kind: TokenKind, project_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            kind,
            project_id: project_id.to_string(),
            keys: RwLock::new(None),
        }
    }

    fn jwks_url(&self) -> &'static str {
        match self.kind {
            TokenKind::FirebaseUser => FIREBASE_JWKS_URL,
            TokenKind::GoogleOidc => GOOGLE_OIDC_JWKS_URL,
        }
    }

    fn issuers(&self) -> Vec<String> {
        match self.kind {
            TokenKind::FirebaseUser => {
                vec![format!("https://securetoken.google.com/{}", self.project_id)]
            }
            TokenKind::GoogleOidc => GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn key_set(&self, force_refresh: bool) -> Result<JwkSet, AuthError> {
        if !force_refresh {
            if let Some(cached) = self.keys.read().await.as_ref() {
                if Utc::now() - cached.fetched_at < Duration::minutes(JWKS_CACHE_MINUTES) {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let keys: JwkSet = self
            .http
            .get(self.jwks_url())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::KeyFetch(e.to_string()))?;

        *self.keys.write().await = Some(CachedKeys {
            keys: keys.clone(),
            fetched_at: Utc::now(),
        });
        Ok(keys)
    }
}

#[async_trait]
impl IdentityVerifier for GoogleTokenVerifier {
    async fn verify_token(
        &self,
        token: &str,
        audiences: &[String],
    ) -> Result<VerifiedIdentity, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token has no key id".into()))?;

        // Keys rotate; refetch once on an unknown kid.
        let mut keys = self.key_set(false).await?;
        if keys.find(&kid).is_none() {
            keys = self.key_set(true).await?;
        }
        let jwk = keys
            .find(&kid)
            .ok_or_else(|| AuthError::InvalidToken(format!("unknown key id {}", kid)))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(audiences);
        validation.set_issuer(&self.issuers());
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let claims = data.claims;

        if self.kind == TokenKind::GoogleOidc && claims.email_verified == Some(false) {
            return Err(AuthError::InvalidToken("email not verified".into()));
        }

        Ok(VerifiedIdentity {
            subject: claims.sub,
            issuer: claims.iss,
            email: claims.email,
        })
    }
}

/// Development verifier. A token `subject` or `subject|email` is accepted
/// as-is.
#[derive(Default)]
pub struct MockVerifier;

#[async_trait]
impl IdentityVerifier for MockVerifier {
    async fn verify_token(
        &self,
        token: &str,
        _audiences: &[String],
    ) -> Result<VerifiedIdentity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let (subject, email) = match token.split_once('|') {
            Some((s, e)) => (s.to_string(), Some(e.to_string())),
            None => (token.to_string(), None),
        };
        Ok(VerifiedIdentity {
            subject,
            issuer: "mock".to_string(),
            email,
        })
    }
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Accepted audiences for a push endpoint: the configured audience, or both
/// scheme variants of the request URL when running behind a proxy that
/// rewrites the scheme.
pub fn push_audiences(configured: Option<&str>, host: Option<&str>, path: &str) -> Vec<String> {
    if let Some(aud) = configured {
        return vec![aud.to_string()];
    }
    match host {
        Some(host) => vec![
            format!("https://{}{}", host, path),
            format!("http://{}{}", host, path),
        ],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert!(matches!(bearer_token(None), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Basic abc")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Bearer   ")), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_push_audiences() {
        assert_eq!(
            push_audiences(Some("https://svc/consume"), Some("ignored"), "/consume"),
            vec!["https://svc/consume"]
        );
        assert_eq!(
            push_audiences(None, Some("svc.run.app"), "/consume"),
            vec!["https://svc.run.app/consume", "http://svc.run.app/consume"]
        );
        assert!(push_audiences(None, None, "/consume").is_empty());
    }

    #[tokio::test]
    async fn test_mock_verifier() {
        let id = MockVerifier.verify_token("user-1", &[]).await.unwrap();
        assert_eq!(id.subject, "user-1");
        assert!(id.email.is_none());

        let push = MockVerifier
            .verify_token("push|pusher@proj.iam.gserviceaccount.com", &[])
            .await
            .unwrap();
        assert_eq!(push.email.as_deref(), Some("pusher@proj.iam.gserviceaccount.com"));
    }

    #[tokio::test]
    async fn test_google_verifier_rejects_malformed_token() {
        let verifier = GoogleTokenVerifier::new(TokenKind::FirebaseUser, "proj");
        let err = verifier
            .verify_token("not-a-jwt", &["proj".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}
