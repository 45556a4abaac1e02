use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{AdminUpdateRequest, CreateUserRequest, PublicUser, UpdateMeRequest, UserData, UsersData},
    repo_types::User,
    services,
};
use crate::{
    auth::extractors::CurrentUser,
    envelope::Envelope,
    errors::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    query::{ListQuery, QueryParams},
    state::AppState,
};

type UserBody = Json<Envelope<UserData>>;

fn user_body(user: &User) -> UserBody {
    Json(Envelope::success(UserData { user: PublicUser::from(user) }))
}

/// Self-service routes; `protect` must run first.
pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/updateMe", patch(update_me))
        .route("/deleteMe", delete(delete_me))
}

/// User management; `protect` and the admin role gate must run first.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).patch(update_user).delete(delete_user))
}

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> UserBody {
    user_body(&user)
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<UpdateMeRequest>,
) -> Result<UserBody, AppError> {
    let user = services::update_me(&state, user, payload).await?;
    Ok(user_body(&user))
}

#[instrument(skip_all)]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, AppError> {
    services::deactivate(&state, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(pairs): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Envelope<UsersData>>, AppError> {
    let query = ListQuery::from_params(&QueryParams::from_pairs(pairs));
    let users = services::list(&state, &query).await?;
    let results = users.len();
    Ok(Json(Envelope::success(UsersData { users }).with_results(results)))
}

#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, UserBody), AppError> {
    let user = services::create(&state, payload).await?;
    Ok((StatusCode::CREATED, user_body(&user)))
}

#[instrument(skip(state))]
pub async fn get_user(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<UserBody, AppError> {
    let user = services::get(&state, id).await?;
    Ok(user_body(&user))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AdminUpdateRequest>,
) -> Result<UserBody, AppError> {
    let user = services::admin_update(&state, id, payload).await?;
    Ok(user_body(&user))
}

#[instrument(skip(state))]
pub async fn delete_user(State(state): State<AppState>, ApiPath(id): ApiPath<Uuid>) -> Result<StatusCode, AppError> {
    services::admin_deactivate(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderValue};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        app::build_app,
        auth::services::issue_session,
        users::repo_types::{NewUser, Role},
    };

    async fn account(state: &AppState, email: &str, role: Role) -> (Uuid, HeaderValue) {
        let user = state
            .store
            .create(NewUser {
                name: email.split('@').next().unwrap().into(),
                email: email.into(),
                password_hash: state.hasher.hash("pass-1234").unwrap(),
                role,
                department: None,
            })
            .await
            .unwrap();
        let session = issue_session(state, user).unwrap();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", session.token)).unwrap();
        (session.user.id, bearer)
    }

    #[tokio::test]
    async fn admin_routes_are_role_gated() {
        let state = AppState::fake();
        let (_, employee) = account(&state, "emp@x.io", Role::Employee).await;
        let (_, admin) = account(&state, "boss@x.io", Role::Admin).await;
        let server = TestServer::new(build_app(state)).unwrap();

        server.get("/api/v1/users").await.assert_status(StatusCode::UNAUTHORIZED);

        let res = server.get("/api/v1/users").add_header(header::AUTHORIZATION, employee).await;
        res.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(res.json::<Value>()["message"], "You do not have permission to perform this action");

        let res = server.get("/api/v1/users").add_header(header::AUTHORIZATION, admin).await;
        res.assert_status_ok();
        let body: Value = res.json();
        assert_eq!(body["results"], 2);
        assert_eq!(body["data"]["users"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_honours_query_string() {
        let state = AppState::fake();
        let (_, admin) = account(&state, "boss@x.io", Role::Admin).await;
        account(&state, "m1@x.io", Role::Manager).await;
        let (m2, _) = account(&state, "m2@x.io", Role::Manager).await;
        let server = TestServer::new(build_app(state)).unwrap();

        let res = server
            .get("/api/v1/users?role=manager&sort=email&fields=email&limit=1&page=2")
            .add_header(header::AUTHORIZATION, admin)
            .await;
        res.assert_status_ok();
        let body: Value = res.json();
        assert_eq!(body["results"], 1);
        assert_eq!(body["data"]["users"][0], json!({ "id": m2.to_string(), "email": "m2@x.io" }));
    }

    #[tokio::test]
    async fn delete_me_deactivates_and_locks_out() {
        let state = AppState::fake();
        let (_, bearer) = account(&state, "emp@x.io", Role::Employee).await;
        let server = TestServer::new(build_app(state)).unwrap();

        server
            .delete("/api/v1/users/deleteMe")
            .add_header(header::AUTHORIZATION, bearer.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get("/api/v1/users/me")
            .add_header(header::AUTHORIZATION, bearer)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .post("/api/v1/users/login")
            .json(&json!({ "email": "emp@x.io", "password": "pass-1234" }))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn update_me_points_to_password_route() {
        let state = AppState::fake();
        let (_, bearer) = account(&state, "emp@x.io", Role::Employee).await;
        let server = TestServer::new(build_app(state)).unwrap();

        let res = server
            .patch("/api/v1/users/updateMe")
            .add_header(header::AUTHORIZATION, bearer)
            .json(&json!({ "password": "new-pass-123", "passwordConfirm": "new-pass-123" }))
            .await;
        res.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            res.json::<Value>()["message"],
            "This route is not for password updates. Please use /updateMyPassword"
        );
    }

    #[tokio::test]
    async fn admin_can_fetch_and_delete_by_id() {
        let state = AppState::fake();
        let (_, admin) = account(&state, "boss@x.io", Role::Admin).await;
        let (target, _) = account(&state, "emp@x.io", Role::Employee).await;
        let server = TestServer::new(build_app(state)).unwrap();
        let path = format!("/api/v1/users/{target}");

        let res = server.get(&path).add_header(header::AUTHORIZATION, admin.clone()).await;
        res.assert_status_ok();
        assert_eq!(res.json::<Value>()["data"]["user"]["email"], "emp@x.io");

        server
            .delete(&path)
            .add_header(header::AUTHORIZATION, admin.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        // still visible to admins after the soft delete
        server.get(&path).add_header(header::AUTHORIZATION, admin.clone()).await.assert_status_ok();

        let missing = format!("/api/v1/users/{}", Uuid::new_v4());
        server
            .get(&missing)
            .add_header(header::AUTHORIZATION, admin)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_input_gets_the_fail_envelope() {
        let state = AppState::fake();
        let (_, admin) = account(&state, "boss@x.io", Role::Admin).await;
        let server = TestServer::new(build_app(state)).unwrap();

        let res = server
            .get("/api/v1/users/not-a-uuid")
            .add_header(header::AUTHORIZATION, admin.clone())
            .await;
        res.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(res.json::<Value>()["status"], "fail");

        let res = server
            .post("/api/v1/users")
            .add_header(header::AUTHORIZATION, admin)
            .json(&json!({ "name": "Eve", "email": ["eve@x.io"] }))
            .await;
        res.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = res.json();
        assert_eq!(body["status"], "fail");
        assert!(body["message"].is_string());
    }
}
