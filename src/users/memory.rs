use std::{cmp::Ordering, collections::HashMap};

use async_trait::async_trait;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    repo::{Scope, StoreError, UserStore},
    repo_types::{Field, NewUser, User, DEFAULT_PHOTO},
};
use crate::query::{Comparison, Condition, Direction, ListQuery};

/// Process-local store used when no database is configured, and by tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(StoreError::DuplicateEmail);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            department: new.department,
            photo: DEFAULT_PHOTO.to_string(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
            version: 0,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid, scope: Scope) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .get(&id)
            .filter(|u| u.active || scope == Scope::IncludeInactive)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.active && u.email == email)
            .cloned())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| {
                u.active
                    && u.password_reset_token.as_deref() == Some(token_hash)
                    && u.password_reset_expires.is_some_and(|exp| exp > now)
            })
            .cloned())
    }

    async fn save(&self, user: &User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        let version = stored.version + 1;
        *stored = User {
            id: stored.id,
            created_at: stored.created_at,
            version,
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<User>, StoreError> {
        let mut predicates = Vec::with_capacity(query.filters.len());
        for filter in &query.filters {
            let field = Field::parse(&filter.field)?;
            let (test, raw) = match &filter.condition {
                Condition::Eq(v) => (Test::Eq, v),
                Condition::Cmp(Comparison::Gt, v) => (Test::Gt, v),
                Condition::Cmp(Comparison::Gte, v) => (Test::Gte, v),
                Condition::Cmp(Comparison::Lt, v) => (Test::Lt, v),
                Condition::Cmp(Comparison::Lte, v) => (Test::Lte, v),
                Condition::Cmp(Comparison::Other(op), _) => {
                    return Err(StoreError::UnsupportedOperator(op.clone()))
                }
            };
            predicates.push((field, test, Scalar::parse(field, raw)?));
        }
        let mut order = Vec::with_capacity(query.sort.len());
        for key in &query.sort {
            order.push((Field::parse(&key.field)?, key.direction));
        }

        let users = self.users.read().await;
        let mut matched: Vec<User> = users
            .values()
            .filter(|u| u.active)
            .filter(|u| {
                predicates.iter().all(|(field, test, expected)| {
                    // missing values never match, as with SQL NULL
                    scalar_of(u, *field)
                        .and_then(|actual| actual.compare(expected))
                        .is_some_and(|ord| test.accepts(ord))
                })
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            order
                .iter()
                .map(|(field, dir)| {
                    let ord = nulls_last(scalar_of(a, *field), scalar_of(b, *field));
                    match dir {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                })
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let take = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(matched.into_iter().skip(skip).take(take).collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum Test {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Test {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Test::Eq => ord.is_eq(),
            Test::Gt => ord.is_gt(),
            Test::Gte => ord.is_ge(),
            Test::Lt => ord.is_lt(),
            Test::Lte => ord.is_le(),
        }
    }
}

/// Comparable field value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scalar {
    Text(String),
    Time(OffsetDateTime),
    Int(i64),
}

impl Scalar {
    fn parse(field: Field, raw: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidValue(format!("'{raw}' for {}", field.column()));
        match field {
            Field::Id => Uuid::parse_str(raw)
                .map(|id| Scalar::Text(id.to_string()))
                .map_err(|_| invalid()),
            Field::CreatedAt | Field::PasswordChangedAt => parse_time(raw).map(Scalar::Time).ok_or_else(invalid),
            Field::Version => raw.parse::<i64>().map(Scalar::Int).map_err(|_| invalid()),
            _ => Ok(Scalar::Text(raw.to_string())),
        }
    }

    fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Time(a), Scalar::Time(b)) => Some(a.cmp(b)),
            (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn scalar_of(user: &User, field: Field) -> Option<Scalar> {
    match field {
        Field::Id => Some(Scalar::Text(user.id.to_string())),
        Field::Name => Some(Scalar::Text(user.name.clone())),
        Field::Email => Some(Scalar::Text(user.email.clone())),
        Field::Role => Some(Scalar::Text(user.role.as_str().to_string())),
        Field::Department => user.department.clone().map(Scalar::Text),
        Field::Photo => Some(Scalar::Text(user.photo.clone())),
        Field::CreatedAt => Some(Scalar::Time(user.created_at)),
        Field::PasswordChangedAt => user.password_changed_at.map(Scalar::Time),
        Field::Version => Some(Scalar::Int(i64::from(user.version))),
    }
}

fn nulls_last(a: Option<Scalar>, b: Option<Scalar>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn parse_time(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(t);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}
