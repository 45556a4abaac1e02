//! Request authentication pipeline.
//!
//! Each stage is a plain function of what the previous one produced; the
//! first failing stage ends the run. [`authenticate`] is the runner used by
//! the `protect` middleware and by the extractors.

use axum::http::{header, HeaderMap};
use thiserror::Error;
use uuid::Uuid;

use super::{
    claims::Claims,
    jwt::{JwtKeys, TokenError},
};
use crate::{
    errors::AppError,
    users::{
        repo::{Scope, StoreError, UserStore},
        repo_types::User,
    },
};

pub const SESSION_COOKIE: &str = "jwt";

#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error("no token presented")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("user {0} no longer exists")]
    UserGone(Uuid),

    #[error("password changed after the token was issued")]
    PasswordChanged,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AuthFailure> for AppError {
    fn from(f: AuthFailure) -> Self {
        match f {
            AuthFailure::MissingToken => {
                AppError::unauthenticated("You are not logged in! Please log in to get access")
            }
            AuthFailure::Token(_) => AppError::unauthenticated("Invalid or expired token. Please log in again"),
            AuthFailure::UserGone(_) => {
                AppError::unauthenticated("The user belonging to this token no longer exists")
            }
            AuthFailure::PasswordChanged => {
                AppError::unauthenticated("User recently changed password! Please log in again")
            }
            AuthFailure::Store(e) => AppError::from(e),
        }
    }
}

/// Bearer header first, then the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Result<String, AuthFailure> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Ok(token.to_string());
    }
    cookie_value(headers, SESSION_COOKIE).ok_or(AuthFailure::MissingToken)
}

pub fn verify_token(keys: &JwtKeys, token: &str) -> Result<Claims, AuthFailure> {
    Ok(keys.verify(token)?)
}

pub async fn load_user(store: &dyn UserStore, claims: &Claims) -> Result<User, AuthFailure> {
    store
        .find_by_id(claims.sub, Scope::Active)
        .await?
        .ok_or(AuthFailure::UserGone(claims.sub))
}

pub fn ensure_not_superseded(user: &User, claims: &Claims) -> Result<(), AuthFailure> {
    if user.changed_password_after(claims.iat) {
        return Err(AuthFailure::PasswordChanged);
    }
    Ok(())
}

/// Runs extract, verify, load and invalidation in order.
pub async fn authenticate(
    keys: &JwtKeys,
    store: &dyn UserStore,
    headers: &HeaderMap,
) -> Result<User, AuthFailure> {
    let token = extract_token(headers)?;
    let claims = verify_token(keys, &token)?;
    let user = load_user(store, &claims).await?;
    ensure_not_superseded(&user, &claims)?;
    Ok(user)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
