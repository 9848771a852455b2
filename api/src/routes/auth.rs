//! Request identity extractors.

use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, HOST},
        request::Parts,
    },
};
use std::sync::Arc;

use crate::error::{ApiError, ErrorCode};
use crate::services::identity::{VerifiedIdentity, bearer_token, push_audiences};
use crate::state::{CreativeState, StrategyState};

fn authorization(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

// ============================================================================
// End users
// ============================================================================

/// Verified Firebase user behind the request's bearer token.
pub struct CallerIdentity(pub VerifiedIdentity);

impl CallerIdentity {
    /// The body's `uid` must be the token's subject.
    pub fn require_uid(&self, uid: &str) -> Result<(), ApiError> {
        if self.0.subject != uid {
            tracing::warn!(
                token_uid = %self.0.subject,
                uid,
                "[auth] Token subject does not match request uid"
            );
            return Err(ApiError::new(
                ErrorCode::UidMismatch,
                "Token uid does not match request uid",
            ));
        }
        Ok(())
    }
}

impl FromRequestParts<Arc<StrategyState>> for CallerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<StrategyState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(authorization(parts))?;
        let audiences = [state.settings.project_id.clone()];
        let identity = state
            .users
            .verify_token(token, &audiences)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, path = parts.uri.path(), "[auth] User token rejected");
                ApiError::from(e)
            })?;
        Ok(CallerIdentity(identity))
    }
}

// ============================================================================
// Push delivery
// ============================================================================

/// Verified push-delivery service account.
pub struct PushCaller(pub VerifiedIdentity);

impl FromRequestParts<Arc<CreativeState>> for PushCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<CreativeState>,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let token = bearer_token(authorization(parts)).map_err(|e| {
            tracing::warn!(path, "[auth] Push request without bearer token");
            ApiError::from(e)
        })?;

        let host = parts.headers.get(HOST).and_then(|v| v.to_str().ok());
        let audiences = push_audiences(state.settings.consume_audience.as_deref(), host, &path);
        if audiences.is_empty() {
            return Err(ApiError::unauthenticated(
                "Cannot determine push audience for this request",
            ));
        }

        let identity = state
            .push_verifier
            .verify_token(token, &audiences)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, path, "[auth] Push token rejected");
                ApiError::from(e)
            })?;

        let expected = state.settings.require_push_identity().map_err(|e| {
            tracing::error!(error = %e, "[auth] Push signing identity not configured");
            ApiError::forbidden("Push signing identity is not configured")
        })?;
        if let Some(expected) = expected {
            if identity.email.as_deref() != Some(expected) {
                tracing::warn!(
                    email = ?identity.email,
                    expected = %expected,
                    "[auth] Push token from unexpected service account"
                );
                return Err(ApiError::forbidden("Push token not issued for the expected service account"));
            }
        }

        Ok(PushCaller(identity))
    }
}
