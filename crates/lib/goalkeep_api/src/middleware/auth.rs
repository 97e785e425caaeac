//! Authentication middleware: bearer token extraction and verification.
//!
//! Any verification failure answers with the same "Invalid or expired token"
//! message; the cause is only logged.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use goalkeep_core::auth::AuthError;
use goalkeep_core::models::auth::Principal;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;

const INVALID_TOKEN: &str = "Invalid or expired token";

/// Verified phase-1 session token, injected for select-program.
#[derive(Debug, Clone)]
pub struct SessionBearer(pub String);

/// Principal resolved from a verified access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

/// Pull the token out of `Authorization: Bearer <token>`.
fn bearer(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::from(AuthError::MissingCredential))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized(INVALID_TOKEN.into()))
}

/// Axum middleware: requires a session token carrying the program-selection
/// stage and injects [`SessionBearer`].
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer(request.headers())?.to_string();
    if let Err(e) = state.auth.tokens().verify_session_token(&token) {
        debug!(cause = %e, "session token rejected");
        return Err(AppError::Unauthorized(INVALID_TOKEN.into()));
    }
    request.extensions_mut().insert(SessionBearer(token));
    Ok(next.run(request).await)
}

/// Axum middleware: requires an access token and injects
/// [`AuthenticatedPrincipal`].
pub async fn require_access(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer(request.headers())?;
    let principal = state.auth.tokens().principal(token).map_err(|e| {
        debug!(cause = %e, "access token rejected");
        AppError::Unauthorized(INVALID_TOKEN.into())
    })?;
    request
        .extensions_mut()
        .insert(AuthenticatedPrincipal(principal));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn bearer_requires_header_and_scheme() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer(&headers), Err(AppError::Unauthorized(m)) if m == "Credential is required."));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer(&headers), Err(AppError::Unauthorized(m)) if m == INVALID_TOKEN));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer(&headers).unwrap(), "abc.def.ghi");
    }
}
