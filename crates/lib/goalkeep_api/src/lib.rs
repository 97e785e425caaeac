//! # goalkeep_api
//!
//! HTTP API library for Goalkeep.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::post;
use goalkeep_core::auth::authorize::ResourceAuthorizer;
use goalkeep_core::auth::service::AuthService;
use goalkeep_core::store::{AssignmentStore, CredentialStore, PgStore, UserDirectory};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::auth;

pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_SELECT_PROGRAM: &str = "/auth/select-program";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";

/// Shared application state passed to all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Login, program selection, refresh and logout.
    pub auth: AuthService,
    /// Per-student access checks for resource handlers.
    pub authz: ResourceAuthorizer,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// State over a store that holds users, refresh tokens and assignments.
    pub fn new<S>(config: ApiConfig, store: Arc<S>) -> Self
    where
        S: CredentialStore + UserDirectory + AssignmentStore + 'static,
    {
        let auth = AuthService::new(&config.auth, store.clone(), store.clone());
        let authz = ResourceAuthorizer::new(store);
        Self {
            auth,
            authz,
            config,
        }
    }

    /// State backed by PostgreSQL.
    pub fn postgres(config: ApiConfig, pool: PgPool) -> Self {
        Self::new(config, Arc::new(PgStore::new(pool)))
    }
}

/// Run embedded database migrations.
///
/// Delegates to `goalkeep_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    goalkeep_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(POST_AUTH_LOGIN, post(auth::login_handler))
        .route(POST_AUTH_REFRESH, post(auth::refresh_handler));

    // Phase 1: session token only
    let session = Router::new()
        .route(POST_AUTH_SELECT_PROGRAM, post(auth::select_program_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_session,
        ));

    // Phase 2: program-scoped access token
    let protected = Router::new()
        .route(POST_AUTH_LOGOUT, post(auth::logout_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_access,
        ));

    Router::new()
        .merge(public)
        .merge(session)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
