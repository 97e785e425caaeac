//! Integration test: build the router over an in-memory store and walk the
//! login → select-program → refresh → logout flow.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use goalkeep_api::{AppState, config::ApiConfig};
use chrono::{Duration, Utc};
use goalkeep_core::auth::AuthError;
use goalkeep_core::auth::authorize::{Operation, ResourceScope};
use goalkeep_core::config::AuthConfig;
use goalkeep_core::models::assignment::{AssignmentKind, AssignmentRecord};
use goalkeep_core::models::auth::{MembershipStatus, UserProgram};
use goalkeep_core::store::MemoryStore;
use goalkeep_core::uuid::uuidv7;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const EMAIL: &str = "rivera@north.example.org";
const PASSWORD: &str = "sprout-kettle-42";

struct TestApp {
    router: Router,
    state: AppState,
    user_id: Uuid,
    program_id: Uuid,
    student_id: Uuid,
}

async fn app() -> TestApp {
    let auth = AuthConfig {
        password_iterations: 10,
        ..AuthConfig::with_signing_key("integration-test-key")
    };
    let store = Arc::new(MemoryStore::new());
    let user_id = store
        .add_user(EMAIL, Some("Sam Rivera"), Some(auth.password_hasher().hash(PASSWORD)))
        .await;
    let program_id = uuidv7();
    store
        .add_membership(
            user_id,
            UserProgram {
                program_id,
                program_name: "North Elementary".into(),
                role: "Teacher".into(),
                role_display_name: "Classroom Teacher".into(),
                is_primary: true,
            },
            MembershipStatus::Active,
        )
        .await;

    let student_id = uuidv7();
    store
        .add_assignment(AssignmentRecord {
            user_id,
            student_id,
            kind: AssignmentKind::Paraeducator,
            start_date: Utc::now().date_naive() - Duration::days(7),
            end_date: None,
            is_active: true,
        })
        .await;

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        pg_connection_url: String::new(),
        auth,
    };
    let state = AppState::new(config, store);
    TestApp {
        router: goalkeep_api::router(state.clone()),
        state,
        user_id,
        program_id,
        student_id,
    }
}

async fn post(router: &Router, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "auth-flow-test")
        .header("x-forwarded-for", "198.51.100.4");
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = req.body(Body::from(body.to_string())).expect("request");

    let resp = router.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}

async fn login(app: &TestApp) -> String {
    let (status, body) = post(
        &app.router,
        "/auth/login",
        None,
        json!({ "email": EMAIL, "password": PASSWORD }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["sessionToken"].as_str().expect("sessionToken").to_string()
}

async fn select(app: &TestApp, session: &str) -> Value {
    let (status, body) = post(
        &app.router,
        "/auth/select-program",
        Some(session),
        json!({ "programId": app.program_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
async fn full_login_flow() {
    let app = app().await;

    let (status, body) = post(
        &app.router,
        "/auth/login",
        None,
        json!({ "email": EMAIL, "password": PASSWORD }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], EMAIL);
    assert_eq!(body["programs"][0]["programName"], "North Elementary");
    assert_eq!(body["programs"][0]["isPrimary"], true);
    let session = body["sessionToken"].as_str().expect("sessionToken");

    let tokens = select(&app, session).await;
    assert_eq!(tokens["tokenType"], "Bearer");
    assert_eq!(tokens["role"], "Teacher");
    assert_eq!(tokens["roleDisplayName"], "Classroom Teacher");
    let expires_in = tokens["expiresIn"].as_i64().expect("expiresIn");
    assert!(expires_in > 0 && expires_in <= 900);
    let access = tokens["accessToken"].as_str().expect("accessToken").to_string();
    let first_refresh = tokens["refreshToken"].as_str().expect("refreshToken").to_string();

    let (status, rotated) = post(
        &app.router,
        "/auth/refresh",
        None,
        json!({ "refreshToken": first_refresh }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{rotated}");
    let second_refresh = rotated["refreshToken"].as_str().expect("refreshToken").to_string();
    assert_ne!(second_refresh, first_refresh);

    let (status, replay) = post(
        &app.router,
        "/auth/refresh",
        None,
        json!({ "refreshToken": first_refresh }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay["message"], "Refresh token has been revoked.");

    let (status, out) = post(
        &app.router,
        "/auth/logout",
        Some(&access),
        json!({ "refreshToken": second_refresh }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(out["message"], "Logged out.");

    let (status, again) = post(
        &app.router,
        "/auth/logout",
        Some(&access),
        json!({ "refreshToken": second_refresh }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["success"], true);
    assert_eq!(again["message"], "Already logged out.");
}

#[tokio::test]
async fn bad_password_and_unknown_email_get_identical_responses() {
    let app = app().await;
    let wrong = post(
        &app.router,
        "/auth/login",
        None,
        json!({ "email": EMAIL, "password": "nope" }),
    )
    .await;
    let unknown = post(
        &app.router,
        "/auth/login",
        None,
        json!({ "email": "nobody@north.example.org", "password": PASSWORD }),
    )
    .await;
    assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong, unknown);
}

#[tokio::test]
async fn missing_login_fields_are_rejected() {
    let app = app().await;
    let (status, body) = post(&app.router, "/auth/login", None, json!({ "email": EMAIL })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn select_program_requires_a_session_token() {
    let app = app().await;

    let (status, body) = post(
        &app.router,
        "/auth/select-program",
        None,
        json!({ "programId": app.program_id }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Credential is required.");

    let session = login(&app).await;
    let access = select(&app, &session).await["accessToken"]
        .as_str()
        .expect("accessToken")
        .to_string();
    let (status, body) = post(
        &app.router,
        "/auth/select-program",
        Some(&access),
        json!({ "programId": app.program_id }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");
}

#[tokio::test]
async fn selecting_an_unassigned_program_is_unauthorized() {
    let app = app().await;
    let session = login(&app).await;
    let (status, body) = post(
        &app.router,
        "/auth/select-program",
        Some(&session),
        json!({ "programId": uuidv7() }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthorized.");
}

#[tokio::test]
async fn malformed_program_id_is_a_validation_error() {
    let app = app().await;
    let session = login(&app).await;
    let (status, body) = post(
        &app.router,
        "/auth/select-program",
        Some(&session),
        json!({ "programId": "not-a-uuid" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "Invalid program ID format.");

    let (status, body) = post(&app.router, "/auth/select-program", Some(&session), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Program ID is required.");
}

#[tokio::test]
async fn logout_rejects_session_tokens_and_foreign_refresh_tokens() {
    let app = app().await;
    let session = login(&app).await;
    let tokens = select(&app, &session).await;
    let refresh = tokens["refreshToken"].as_str().expect("refreshToken");

    let (status, body) = post(
        &app.router,
        "/auth/logout",
        Some(&session),
        json!({ "refreshToken": refresh }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired token");

    let access = tokens["accessToken"].as_str().expect("accessToken");
    let (status, _) = post(
        &app.router,
        "/auth/logout",
        Some(access),
        json!({ "refreshToken": format!("{}.not-the-secret", uuidv7()) }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_refresh_token_is_unauthorized() {
    let app = app().await;
    let (status, body) = post(
        &app.router,
        "/auth/refresh",
        None,
        json!({ "refreshToken": "not-a-token" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn app_state_authorizes_against_the_shared_store() {
    let app = app().await;
    let authz = &app.state.authz;
    let student = ResourceScope::Student {
        student_id: app.student_id,
    };

    let kind = authz
        .authorize(app.user_id, student, Operation::AddProgressEntry)
        .await
        .unwrap();
    assert_eq!(kind, AssignmentKind::Paraeducator);
    assert!(matches!(
        authz.authorize(app.user_id, student, Operation::CreateGoal).await,
        Err(AuthError::PolicyDenied(_))
    ));

    let own = ResourceScope::Entry {
        student_id: app.student_id,
        entry_id: uuidv7(),
        created_by: app.user_id,
    };
    let foreign = ResourceScope::Entry {
        student_id: app.student_id,
        entry_id: uuidv7(),
        created_by: uuidv7(),
    };
    assert!(authz.authorize(app.user_id, own, Operation::EditProgressEntry).await.is_ok());
    assert!(matches!(
        authz.authorize(app.user_id, foreign, Operation::EditProgressEntry).await,
        Err(AuthError::PolicyDenied(_))
    ));

    assert_eq!(
        authz.accessible_students(app.user_id).await.unwrap(),
        vec![app.student_id]
    );
}
