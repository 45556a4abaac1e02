use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    dto::{AdminUpdateRequest, CreateUserRequest, PublicUser, UpdateMeRequest},
    repo::Scope,
    repo_types::{NewUser, Role, User},
    validate,
};
use crate::{errors::AppError, query::ListQuery, state::AppState};

const PASSWORD_ROUTE_HINT: &str =
    "This route is not for password updates. Please use /updateMyPassword";

fn reject_password_fields(password: &Option<String>, confirm: &Option<String>) -> Result<(), AppError> {
    if password.is_some() || confirm.is_some() {
        return Err(AppError::validation(PASSWORD_ROUTE_HINT));
    }
    Ok(())
}

/// Blank strings clear an optional text field.
fn optional_text(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_me(state: &AppState, mut user: User, req: UpdateMeRequest) -> Result<User, AppError> {
    reject_password_fields(&req.password, &req.password_confirm)?;

    if let Some(name) = req.name {
        user.name = validate::name(&name)?;
    }
    if let Some(email) = req.email {
        user.email = validate::email(&email)?;
    }
    if let Some(department) = req.department {
        user.department = optional_text(department);
    }
    let user = state.store.save(&user).await?;
    info!("profile updated");
    Ok(user)
}

/// Soft delete: the record stays but every active-only lookup skips it.
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn deactivate(state: &AppState, mut user: User) -> Result<(), AppError> {
    user.active = false;
    state.store.save(&user).await?;
    info!("account deactivated");
    Ok(())
}

/// Runs the list query and projects each record.
#[instrument(skip(state))]
pub async fn list(state: &AppState, query: &ListQuery) -> Result<Vec<Value>, AppError> {
    let users = state.store.list(query).await?;
    let mut rows = Vec::with_capacity(users.len());
    for user in &users {
        let value = serde_json::to_value(PublicUser::from(user)).map_err(anyhow::Error::from)?;
        rows.push(query.projection.apply(value));
    }
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn create(state: &AppState, req: CreateUserRequest) -> Result<User, AppError> {
    let name = validate::name(req.name.as_deref().unwrap_or_default())?;
    let email = validate::email(req.email.as_deref().unwrap_or_default())?;
    let password = validate::new_password(req.password.as_deref(), req.password_confirm.as_deref())?;
    let role = match req.role.as_deref() {
        Some(raw) => validate::role(raw)?,
        None => Role::default(),
    };

    let user = state
        .store
        .create(NewUser {
            name,
            email,
            password_hash: state.hasher.hash(&password)?,
            role,
            department: req.department.and_then(optional_text),
        })
        .await?;
    info!(user_id = %user.id, role = %user.role, "user created by admin");
    Ok(user)
}

/// Admin lookup; deactivated accounts are visible here.
pub async fn get(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .store
        .find_by_id(id, Scope::IncludeInactive)
        .await?
        .ok_or_else(|| AppError::NotFound("No user found with that ID".into()))
}

#[instrument(skip(state, req))]
pub async fn admin_update(state: &AppState, id: Uuid, req: AdminUpdateRequest) -> Result<User, AppError> {
    reject_password_fields(&req.password, &req.password_confirm)?;
    let mut user = get(state, id).await?;

    if let Some(name) = req.name {
        user.name = validate::name(&name)?;
    }
    if let Some(email) = req.email {
        user.email = validate::email(&email)?;
    }
    if let Some(role) = req.role {
        user.role = validate::role(&role)?;
    }
    if let Some(department) = req.department {
        user.department = optional_text(department);
    }
    if let Some(photo) = req.photo {
        user.photo = optional_text(photo).ok_or_else(|| AppError::validation("Photo cannot be empty"))?;
    }
    if let Some(active) = req.active {
        user.active = active;
    }

    let user = state.store.save(&user).await?;
    info!(user_id = %user.id, "user updated by admin");
    Ok(user)
}

#[instrument(skip(state))]
pub async fn admin_deactivate(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let user = get(state, id).await?;
    deactivate(state, user).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryParams;

    async fn seed(state: &AppState, name: &str, email: &str, role: &str) -> User {
        create(
            state,
            CreateUserRequest {
                name: Some(name.into()),
                email: Some(email.into()),
                password: Some("pass-1234".into()),
                password_confirm: Some("pass-1234".into()),
                role: Some(role.into()),
                department: None,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn update_me_rejects_password_fields() {
        let state = AppState::fake();
        let user = seed(&state, "Ada", "ada@x.io", "employee").await;
        let err = update_me(
            &state,
            user,
            UpdateMeRequest { password: Some("sneaky-pass".into()), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert_eq!(err.user_message(), PASSWORD_ROUTE_HINT);
    }

    #[tokio::test]
    async fn update_me_changes_profile_fields() {
        let state = AppState::fake();
        let user = seed(&state, "Ada", "ada@x.io", "employee").await;
        let updated = update_me(
            &state,
            user.clone(),
            UpdateMeRequest {
                name: Some("Ada L".into()),
                department: Some("research".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "Ada L");
        assert_eq!(updated.department.as_deref(), Some("research"));
        assert_eq!(updated.role, user.role);
        assert_eq!(updated.version, user.version + 1);
    }

    #[tokio::test]
    async fn email_change_to_taken_address_conflicts() {
        let state = AppState::fake();
        seed(&state, "Ada", "ada@x.io", "employee").await;
        let bob = seed(&state, "Bob", "bob@x.io", "employee").await;
        let err = update_me(
            &state,
            bob,
            UpdateMeRequest { email: Some("ADA@x.io".into()), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivated_users_leave_listings_but_admin_can_restore() {
        let state = AppState::fake();
        let ada = seed(&state, "Ada", "ada@x.io", "employee").await;
        seed(&state, "Bob", "bob@x.io", "manager").await;

        admin_deactivate(&state, ada.id).await.unwrap();
        let all = list(&state, &ListQuery::from_params(&QueryParams::default())).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0]["name"], "Bob");
        assert!(all[0].get("__v").is_none());

        assert!(!get(&state, ada.id).await.unwrap().active);
        let restored = admin_update(
            &state,
            ada.id,
            AdminUpdateRequest { active: Some(true), ..Default::default() },
        )
        .await
        .unwrap();
        assert!(restored.active);
    }

    #[tokio::test]
    async fn list_applies_filters_and_projection() {
        let state = AppState::fake();
        seed(&state, "Ada", "ada@x.io", "admin").await;
        seed(&state, "Bob", "bob@x.io", "manager").await;
        seed(&state, "Cy", "cy@x.io", "manager").await;

        let params = QueryParams::from_pairs([("role", "manager"), ("sort", "name"), ("fields", "name,email")]);
        let rows = list(&state, &ListQuery::from_params(&params)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Bob");
        assert_eq!(rows[1]["name"], "Cy");
        assert!(rows[0].get("role").is_none());
    }

    #[tokio::test]
    async fn unknown_filter_field_is_a_validation_error() {
        let state = AppState::fake();
        let params = QueryParams::from_pairs([("passwordHash", "x")]);
        let err = list(&state, &ListQuery::from_params(&params)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn admin_create_rejects_unknown_role() {
        let state = AppState::fake();
        let err = create(
            &state,
            CreateUserRequest {
                name: Some("Eve".into()),
                email: Some("eve@x.io".into()),
                password: Some("pass-1234".into()),
                password_confirm: Some("pass-1234".into()),
                role: Some("root".into()),
                department: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let state = AppState::fake();
        let err = get(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
