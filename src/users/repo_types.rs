use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::repo::StoreError;

/// Access level of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Employee,
    Manager,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Employee, Role::Manager, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

pub const DEFAULT_PHOTO: &str = "default.jpg";

/// Backdating applied to `password_changed_at` so a token signed in the same
/// instant as the change is not rejected.
pub const PASSWORD_CHANGE_SKEW: Duration = Duration::seconds(1);

/// User record as held by the credential store.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub department: Option<String>,
    pub photo: String,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub version: i32,
}

impl User {
    /// Replace the password hash and stamp the change time.
    pub fn set_password(&mut self, password_hash: String, now: OffsetDateTime) {
        self.password_hash = password_hash;
        self.password_changed_at = Some(now - PASSWORD_CHANGE_SKEW);
    }

    /// True when the password changed after a token issued at `issued_at`
    /// (unix seconds).
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed) => changed.unix_timestamp() > issued_at,
            None => false,
        }
    }

    pub fn set_reset_token(&mut self, token_hash: String, expires: OffsetDateTime) {
        self.password_reset_token = Some(token_hash);
        self.password_reset_expires = Some(expires);
    }

    pub fn clear_reset_token(&mut self) {
        self.password_reset_token = None;
        self.password_reset_expires = None;
    }
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub department: Option<String>,
}

/// Raw `users` row; `role` is stored as text.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub department: Option<String>,
    pub photo: String,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub version: i32,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role = r.role.parse::<Role>().map_err(StoreError::Corrupt)?;
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            password_hash: r.password_hash,
            role,
            department: r.department,
            photo: r.photo,
            password_changed_at: r.password_changed_at,
            password_reset_token: r.password_reset_token,
            password_reset_expires: r.password_reset_expires,
            active: r.active,
            created_at: r.created_at,
            version: r.version,
        })
    }
}

/// Columns a list query may filter or sort on, keyed by their public name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Name,
    Email,
    Role,
    Department,
    Photo,
    CreatedAt,
    PasswordChangedAt,
    Version,
}

impl Field {
    pub fn parse(name: &str) -> Result<Self, StoreError> {
        Ok(match name {
            "id" => Field::Id,
            "name" => Field::Name,
            "email" => Field::Email,
            "role" => Field::Role,
            "department" => Field::Department,
            "photo" => Field::Photo,
            "createdAt" => Field::CreatedAt,
            "passwordChangedAt" => Field::PasswordChangedAt,
            "__v" => Field::Version,
            other => return Err(StoreError::UnknownField(other.to_string())),
        })
    }

    pub fn column(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::Email => "email",
            Field::Role => "role",
            Field::Department => "department",
            Field::Photo => "photo",
            Field::CreatedAt => "created_at",
            Field::PasswordChangedAt => "password_changed_at",
            Field::Version => "version",
        }
    }

    /// Postgres type the bound text parameter is cast to.
    pub fn cast(&self) -> &'static str {
        match self {
            Field::Id => "uuid",
            Field::CreatedAt | Field::PasswordChangedAt => "timestamptz",
            Field::Version => "int4",
            _ => "text",
        }
    }
}
