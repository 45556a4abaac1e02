use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest},
        extractors::{CurrentUser, OptionalUser},
        guard::SESSION_COOKIE,
        services::{self, Session},
    },
    envelope::Envelope,
    errors::AppError,
    extract::{ApiJson, ApiPath},
    state::AppState,
    users::dto::{PublicUser, UserData},
};

/// Seconds the logout placeholder cookie lives.
const LOGGED_OUT_MAX_AGE: i64 = 10;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/forgotPassword", post(forgot_password))
        .route("/resetPassword/:token", patch(reset_password))
}

/// Routes that expect `protect` to run first.
pub fn account_routes() -> Router<AppState> {
    Router::new().route("/updateMyPassword", patch(update_my_password))
}

fn is_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|p| p.eq_ignore_ascii_case("https"))
}

pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn session_response(state: &AppState, headers: &HeaderMap, status: StatusCode, session: Session) -> Response {
    let max_age = state.config.jwt.cookie_ttl_days * 24 * 60 * 60;
    let cookie = session_cookie(&session.token, max_age, is_https(headers));
    let body = Envelope::success(UserData { user: PublicUser::from(&session.user) }).with_token(session.token);
    (status, [(header::SET_COOKIE, cookie)], Json(body)).into_response()
}

/// Origin used in reset links: configured base URL, else the request's host.
fn public_base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.config.public_base_url {
        return base.clone();
    }
    let scheme = if is_https(headers) { "https" } else { "http" };
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

#[instrument(skip(state, headers, payload))]
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SignupRequest>,
) -> Result<Response, AppError> {
    let session = services::signup(&state, payload).await?;
    Ok(session_response(&state, &headers, StatusCode::CREATED, session))
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Response, AppError> {
    let session = services::login(&state, payload).await?;
    Ok(session_response(&state, &headers, StatusCode::OK, session))
}

#[instrument(skip_all)]
pub async fn logout(headers: HeaderMap, OptionalUser(user): OptionalUser) -> Response {
    if let Some(user) = user {
        info!(user_id = %user.id, "user logged out");
    }
    let cookie = session_cookie("loggedout", LOGGED_OUT_MAX_AGE, is_https(&headers));
    ([(header::SET_COOKIE, cookie)], Json(Envelope::ok())).into_response()
}

#[instrument(skip(state, headers, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<Envelope<()>>, AppError> {
    let base = public_base_url(&state, &headers);
    services::request_reset(&state, payload, &base).await?;
    Ok(Json(Envelope::message("Token sent to email!")))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let session = services::consume_reset(&state, &token, payload).await?;
    Ok(session_response(&state, &headers, StatusCode::OK, session))
}

#[instrument(skip_all)]
pub async fn update_my_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<UpdatePasswordRequest>,
) -> Result<Response, AppError> {
    let session = services::update_password(&state, user, payload).await?;
    Ok(session_response(&state, &headers, StatusCode::OK, session))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use super::*;
    use crate::{app::build_app, notify::testing::RecordingNotifier};

    fn server(state: AppState) -> TestServer {
        TestServer::new(build_app(state)).unwrap()
    }

    fn signup_body(email: &str) -> Value {
        json!({
            "name": "Test User",
            "email": email,
            "password": "pass-1234",
            "passwordConfirm": "pass-1234",
        })
    }

    #[test]
    fn cookie_format() {
        assert_eq!(session_cookie("abc", 60, false), "jwt=abc; Path=/; HttpOnly; Max-Age=60");
        assert!(session_cookie("abc", 60, true).ends_with("; Secure"));
    }

    #[tokio::test]
    async fn signup_sets_cookie_and_returns_token() {
        let server = server(AppState::fake());
        let res = server.post("/api/v1/users/signup").json(&signup_body("a@b.io")).await;
        res.assert_status(StatusCode::CREATED);

        let cookie = res.header(header::SET_COOKIE);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("jwt="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains(&format!("Max-Age={}", 24 * 60 * 60)));

        let body: Value = res.json();
        assert_eq!(body["status"], "success");
        assert!(body["token"].is_string());
        assert_eq!(body["data"]["user"]["email"], "a@b.io");
        assert!(body["data"]["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn login_failure_uses_fail_envelope() {
        let server = server(AppState::fake());
        server.post("/api/v1/users/signup").json(&signup_body("a@b.io")).await;

        let res = server
            .post("/api/v1/users/login")
            .json(&json!({ "email": "a@b.io", "password": "wrong-one" }))
            .await;
        res.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = res.json();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "Incorrect email or password");
    }

    #[tokio::test]
    async fn logout_overwrites_cookie() {
        let server = server(AppState::fake());
        let res = server.get("/api/v1/users/logout").await;
        res.assert_status_ok();
        let cookie = res.header(header::SET_COOKIE);
        assert!(cookie.to_str().unwrap().starts_with("jwt=loggedout;"));
        assert!(cookie.to_str().unwrap().contains("Max-Age=10"));
    }

    #[tokio::test]
    async fn session_cookie_authenticates() {
        let server = server(AppState::fake());
        let res = server.post("/api/v1/users/signup").json(&signup_body("a@b.io")).await;
        let token = res.json::<Value>()["token"].as_str().unwrap().to_string();

        let res = server
            .get("/api/v1/users/me")
            .add_header(header::COOKIE, HeaderValue::from_str(&format!("jwt={token}")).unwrap())
            .await;
        res.assert_status_ok();

        server.get("/api/v1/users/me").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reset_flow_over_http() {
        let notifier = Arc::new(RecordingNotifier::default());
        let server = server(AppState::fake_with_notifier(notifier.clone()));
        server.post("/api/v1/users/signup").json(&signup_body("a@b.io")).await;

        let res = server
            .post("/api/v1/users/forgotPassword")
            .json(&json!({ "email": "a@b.io" }))
            .await;
        res.assert_status_ok();
        assert_eq!(res.json::<Value>()["message"], "Token sent to email!");

        let url = notifier.last_reset_url().unwrap();
        let path = url.split_once("/api/v1").map(|(_, p)| format!("/api/v1{p}")).unwrap();
        let body = json!({ "password": "fresh-pass-1", "passwordConfirm": "fresh-pass-1" });

        server.patch(&path).json(&body).await.assert_status_ok();
        let again = server.patch(&path).json(&body).await;
        again.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(again.json::<Value>()["status"], "fail");
    }

    #[tokio::test]
    async fn undelivered_reset_is_a_server_error() {
        let server = server(AppState::fake_with_notifier(Arc::new(RecordingNotifier::failing())));
        server.post("/api/v1/users/signup").json(&signup_body("a@b.io")).await;

        let res = server
            .post("/api/v1/users/forgotPassword")
            .json(&json!({ "email": "a@b.io" }))
            .await;
        res.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.json::<Value>()["status"], "error");
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_fail_envelope() {
        let server = server(AppState::fake());

        let res = server
            .post("/api/v1/users/login")
            .json(&json!({ "email": 123, "password": "pass-1234" }))
            .await;
        res.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(res.json::<Value>()["status"], "fail");

        let res = server
            .post("/api/v1/users/login")
            .text("{not json")
            .content_type("application/json")
            .await;
        res.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = res.json();
        assert_eq!(body["status"], "fail");
        assert!(body["message"].is_string());
    }
}
