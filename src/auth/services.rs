use axum::extract::FromRef;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SignupRequest, UpdatePasswordRequest},
    jwt::JwtKeys,
    reset::{hash_token, ResetToken},
};
use crate::{
    errors::AppError,
    state::AppState,
    users::{
        repo_types::{NewUser, Role, User},
        validate,
    },
};

pub const RESET_PATH: &str = "/api/v1/users/resetPassword";

/// A user together with a freshly signed bearer token.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

pub fn issue_session(state: &AppState, user: User) -> Result<Session, AppError> {
    let token = JwtKeys::from_ref(state).sign(user.id)?;
    Ok(Session { user, token })
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[instrument(skip(state, req))]
pub async fn signup(state: &AppState, req: SignupRequest) -> Result<Session, AppError> {
    let name = validate::name(req.name.as_deref().unwrap_or_default())?;
    let email = validate::email(req.email.as_deref().unwrap_or_default())?;
    let password = validate::new_password(req.password.as_deref(), req.password_confirm.as_deref())?;

    let password_hash = state.hasher.hash(&password)?;
    let user = state
        .store
        .create(NewUser {
            name,
            email,
            password_hash,
            role: Role::Employee,
            department: non_empty(req.department),
        })
        .await?;

    // account already exists; a lost welcome mail is not worth failing over
    if let Err(e) = state.notifier.send_welcome(&user).await {
        warn!(error = %e, user_id = %user.id, "welcome notification failed");
    }

    info!(user_id = %user.id, email = %user.email, "user signed up");
    issue_session(state, user)
}

#[instrument(skip(state, req))]
pub async fn login(state: &AppState, req: LoginRequest) -> Result<Session, AppError> {
    let (Some(email), Some(password)) = (non_empty(req.email), req.password.filter(|p| !p.is_empty()))
    else {
        return Err(AppError::validation("Please provide an email and password"));
    };
    let email = email.to_lowercase();
    let rejected = || AppError::InvalidCredentials("Incorrect email or password".into());

    let Some(user) = state.store.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(rejected());
    };
    if !state.hasher.verify(&password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(rejected());
    }

    info!(user_id = %user.id, "user logged in");
    issue_session(state, user)
}

/// Mints a reset token, stores its hash and hands the link to the notifier.
/// If delivery fails the stored token is withdrawn again.
#[instrument(skip(state, req))]
pub async fn request_reset(
    state: &AppState,
    req: ForgotPasswordRequest,
    base_url: &str,
) -> Result<(), AppError> {
    let email = non_empty(req.email)
        .map(|e| e.to_lowercase())
        .ok_or_else(|| AppError::validation("Please provide an email address"))?;
    let mut user = state
        .store
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with this email address".into()))?;

    let token = ResetToken::generate();
    let expires = OffsetDateTime::now_utc() + Duration::minutes(state.config.reset_token_ttl_minutes);
    user.set_reset_token(token.hash, expires);
    let mut user = state.store.save(&user).await?;

    let url = format!("{}{RESET_PATH}/{}", base_url.trim_end_matches('/'), token.plain);
    if let Err(e) = state.notifier.send_password_reset(&user, &url).await {
        user.clear_reset_token();
        if let Err(rollback) = state.store.save(&user).await {
            error!(error = %rollback, user_id = %user.id, "failed to withdraw undelivered reset token");
        }
        return Err(AppError::Delivery(e));
    }

    info!(user_id = %user.id, "password reset token issued");
    Ok(())
}

#[instrument(skip_all)]
pub async fn consume_reset(
    state: &AppState,
    plain_token: &str,
    req: ResetPasswordRequest,
) -> Result<Session, AppError> {
    let now = OffsetDateTime::now_utc();
    let mut user = state
        .store
        .find_by_reset_token(&hash_token(plain_token), now)
        .await?
        .ok_or(AppError::InvalidOrExpiredToken)?;

    let password = validate::new_password(req.password.as_deref(), req.password_confirm.as_deref())?;
    user.set_password(state.hasher.hash(&password)?, now);
    user.clear_reset_token();
    let user = state.store.save(&user).await?;

    info!(user_id = %user.id, "password reset completed");
    issue_session(state, user)
}

#[instrument(skip_all, fields(user_id = %current.id))]
pub async fn update_password(
    state: &AppState,
    current: User,
    req: UpdatePasswordRequest,
) -> Result<Session, AppError> {
    let supplied = req.password_current.as_deref().unwrap_or_default();
    if supplied.is_empty() || !state.hasher.verify(supplied, &current.password_hash)? {
        warn!("password update with wrong current password");
        return Err(AppError::InvalidCredentials("Your current password is wrong".into()));
    }

    let password = validate::new_password(req.password.as_deref(), req.password_confirm.as_deref())?;
    let mut user = current;
    user.set_password(state.hasher.hash(&password)?, OffsetDateTime::now_utc());
    let user = state.store.save(&user).await?;

    info!("password updated");
    issue_session(state, user)
}
