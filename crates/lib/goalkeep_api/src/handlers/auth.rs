//! Authentication request handlers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{AuthenticatedPrincipal, SessionBearer};
use crate::models::{
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, RefreshRequest, RefreshResponse,
    SelectProgramRequest, TokenResponse,
};
use crate::services::auth;

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let resp = auth::login(&state.auth, &body.email, &body.password).await?;
    Ok(Json(resp))
}

/// `POST /auth/select-program`: exchange the session token for program-scoped
/// tokens. Requires a session bearer token.
pub async fn select_program_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Extension(SessionBearer(session_token)): Extension<SessionBearer>,
    Json(body): Json<SelectProgramRequest>,
) -> AppResult<Json<TokenResponse>> {
    let client = auth::client_context(&headers);
    let resp = auth::select_program(&state.auth, &session_token, &body.program_id, &client).await?;
    Ok(Json(resp))
}

/// `POST /auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let client = auth::client_context(&headers);
    let resp = auth::refresh(&state.auth, &body.refresh_token, &client).await?;
    Ok(Json(resp))
}

/// `POST /auth/logout`: revoke a refresh token. Requires an access token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedPrincipal(principal)): Extension<AuthenticatedPrincipal>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    let resp = auth::logout(&state.auth, &principal, &body.refresh_token).await?;
    Ok(Json(resp))
}
