//! Authentication service: login/select/refresh/logout flows delegating to
//! `goalkeep_core::auth::service`, shaped into wire responses.

use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use goalkeep_core::auth::refresh::Revocation;
use goalkeep_core::auth::service::AuthService;
use goalkeep_core::models::auth::{ClientContext, Principal};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AuthUser, LoginResponse, LogoutResponse, ProgramSummary, RefreshResponse, TokenResponse,
};

const TOKEN_TYPE: &str = "Bearer";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_program_id(raw: &str) -> AppResult<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::Validation("Program ID is required.".into()));
    }
    Uuid::parse_str(raw).map_err(|_| AppError::Validation("Invalid program ID format.".into()))
}

/// Caller IP (first `X-Forwarded-For` hop) and user agent.
pub fn client_context(headers: &HeaderMap) -> ClientContext {
    ClientContext {
        ip_address: header_str(headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string()),
        user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
    }
}

/// Authenticate with email + password.
pub async fn login(auth: &AuthService, email: &str, password: &str) -> AppResult<LoginResponse> {
    let session = auth.login(email, password).await?;
    Ok(LoginResponse {
        session_token: session.session_token,
        expires_in: session.expires_in,
        user: AuthUser {
            id: session.user_id,
            email: session.email,
            name: session.name,
        },
        programs: session.programs.into_iter().map(ProgramSummary::from).collect(),
    })
}

/// Exchange a session token for program-scoped tokens.
pub async fn select_program(
    auth: &AuthService,
    session_token: &str,
    program_id: &str,
    client: &ClientContext,
) -> AppResult<TokenResponse> {
    let program_id = parse_program_id(program_id)?;
    let issued = auth.select_program(session_token, program_id, client).await?;
    Ok(TokenResponse {
        access_token: issued.access_token,
        refresh_token: issued.refresh_token,
        expires_in: issued.expires_in,
        token_type: TOKEN_TYPE.to_string(),
        user_id: issued.user_id,
        email: issued.email,
        program_id: issued.program_id,
        program_name: issued.program_name,
        role: issued.role,
        role_display_name: issued.role_display_name,
    })
}

/// Refresh an access token using a refresh token (single-use rotation).
pub async fn refresh(
    auth: &AuthService,
    refresh_token: &str,
    client: &ClientContext,
) -> AppResult<RefreshResponse> {
    let rotated = auth.refresh(refresh_token, client).await?;
    Ok(RefreshResponse {
        access_token: rotated.access_token,
        refresh_token: rotated.refresh_token,
        expires_in: rotated.expires_in,
        token_type: TOKEN_TYPE.to_string(),
        program_id: rotated.program_id,
        role: rotated.role,
    })
}

/// Logout: revoke the caller's refresh token.
pub async fn logout(
    auth: &AuthService,
    principal: &Principal,
    refresh_token: &str,
) -> AppResult<LogoutResponse> {
    let message = match auth.logout_as(principal, refresh_token).await? {
        Revocation::Revoked => "Logged out.",
        Revocation::AlreadyRevoked => "Already logged out.",
    };
    Ok(LogoutResponse {
        success: true,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn client_context_reads_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let ctx = client_context(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn program_id_must_be_present_and_well_formed() {
        let id = Uuid::now_v7();
        assert_eq!(parse_program_id(&id.to_string()).unwrap(), id);
        assert!(matches!(parse_program_id(""), Err(AppError::Validation(ref m)) if m == "Program ID is required."));
        assert!(matches!(
            parse_program_id("not-a-uuid"),
            Err(AppError::Validation(ref m)) if m == "Invalid program ID format."
        ));
    }

    #[test]
    fn client_context_tolerates_missing_headers() {
        let ctx = client_context(&HeaderMap::new());
        assert!(ctx.ip_address.is_none());
        assert!(ctx.user_agent.is_none());
    }
}
