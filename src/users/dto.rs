use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Role, User};

/// Client-facing view of a user. Credentials and reset state never appear.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub photo: String,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none", default)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(rename = "__v")]
    pub version: i32,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
            department: u.department.clone(),
            photo: u.photo.clone(),
            password_changed_at: u.password_changed_at,
            created_at: u.created_at,
            version: u.version,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserData<T = PublicUser> {
    pub user: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersData {
    pub users: Vec<serde_json::Value>,
}

/// Body of `PATCH /updateMe`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub department: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

/// Body of `POST /` (admin).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

/// Body of `PATCH /:id` (admin).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub photo: Option<String>,
    pub active: Option<bool>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}
