use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

use super::{guard::authenticate, jwt::JwtKeys};
use crate::{
    errors::AppError,
    state::AppState,
    users::repo_types::{Role, User},
};

/// The authenticated user of this request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // `protect` may already have done the work
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }
        let keys = JwtKeys::from_ref(state);
        let user = authenticate(&keys, state.store.as_ref(), &parts.headers).await?;
        Ok(CurrentUser(user))
    }
}

/// Like [`CurrentUser`] but never rejects: any failure yields `None`.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>() {
            return Ok(OptionalUser(Some(user.clone())));
        }
        let keys = JwtKeys::from_ref(state);
        match authenticate(&keys, state.store.as_ref(), &parts.headers).await {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(reason) => {
                debug!(%reason, "continuing without an authenticated user");
                Ok(OptionalUser(None))
            }
        }
    }
}

/// Middleware: authenticate or reject with 401, then attach [`CurrentUser`].
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let user = authenticate(&keys, state.store.as_ref(), req.headers()).await?;
    debug!(user_id = %user.id, role = %user.role, "request authenticated");
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Middleware: admit only roles in the allow-list. Must be layered inside
/// [`protect`].
pub async fn restrict_to(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(CurrentUser(user)) = req.extensions().get::<CurrentUser>() else {
        error!(path = %req.uri().path(), "role gate reached without an authenticated user");
        return Err(AppError::Internal(anyhow::anyhow!(
            "role gate ran before authentication"
        )));
    };
    check_role(user.role, allowed)?;
    Ok(next.run(req).await)
}

pub fn check_role(role: Role, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You do not have permission to perform this action".into(),
        ))
    }
}
