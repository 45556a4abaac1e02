use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Field, NewUser, User, UserRow, DEFAULT_PHOTO};
use crate::query::{Comparison, Condition, Direction, ListQuery};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("user not found")]
    NotFound,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            match db.code().as_deref() {
                Some("23505") => return StoreError::DuplicateEmail,
                // data exceptions: bad uuid/timestamp/integer literals
                Some(code) if code.starts_with("22") => {
                    return StoreError::InvalidValue(db.message().to_string())
                }
                _ => {}
            }
        }
        StoreError::Database(e)
    }
}

/// Which records a by-id lookup may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Active,
    IncludeInactive,
}

/// Persistence for user records. Every lookup hides deactivated users
/// unless told otherwise.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid, scope: Scope) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Active user holding `token_hash` whose reset window is still open at `now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    /// Writes every mutable field of `user` and bumps its version.
    async fn save(&self, user: &User) -> Result<User, StoreError>;

    async fn list(&self, query: &ListQuery) -> Result<Vec<User>, StoreError>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, department, photo, \
     password_changed_at, password_reset_token, password_reset_expires, active, created_at, version";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        bind: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {predicate} AND active = TRUE"
        ))
        .bind(bind)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, department, photo)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(&new.department)
        .bind(DEFAULT_PHOTO)
        .fetch_one(&self.db)
        .await?;
        User::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid, scope: Scope) -> Result<Option<User>, StoreError> {
        let sql = match scope {
            Scope::Active => format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active = TRUE"),
            Scope::IncludeInactive => format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
        };
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_where("email = $1", email).await
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE password_reset_token = $1
              AND password_reset_expires > $2
              AND active = TRUE
            "#
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn save(&self, user: &User) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = $2,
                email = $3,
                password_hash = $4,
                role = $5,
                department = $6,
                photo = $7,
                password_changed_at = $8,
                password_reset_token = $9,
                password_reset_expires = $10,
                active = $11,
                version = version + 1
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(&user.department)
        .bind(&user.photo)
        .bind(user.password_changed_at)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(user.active)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)?;
        User::try_from(row)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<User>, StoreError> {
        let rows = list_sql(query)?
            .build_query_as::<UserRow>()
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(User::try_from).collect()
    }
}

/// Compiles a list query into SQL over the active users. Field names are
/// checked against [`Field`]; every value is bound and cast to the column type.
fn list_sql(query: &ListQuery) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE active = TRUE"));

    for filter in &query.filters {
        let field = Field::parse(&filter.field)?;
        let (op, value) = match &filter.condition {
            Condition::Eq(v) => (" = ", v),
            Condition::Cmp(cmp, v) => (sql_operator(cmp)?, v),
        };
        qb.push(" AND ")
            .push(field.column())
            .push(op)
            .push_bind(value.clone())
            .push("::")
            .push(field.cast());
    }

    if !query.sort.is_empty() {
        qb.push(" ORDER BY ");
        let mut order = qb.separated(", ");
        for key in &query.sort {
            let field = Field::parse(&key.field)?;
            let dir = match key.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            order.push(format!("{} {dir}", field.column()));
        }
    }

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ").push_bind(to_i64(limit));
    }
    qb.push(" OFFSET ").push_bind(to_i64(query.skip));
    Ok(qb)
}

fn sql_operator(cmp: &Comparison) -> Result<&'static str, StoreError> {
    Ok(match cmp {
        Comparison::Gt => " > ",
        Comparison::Gte => " >= ",
        Comparison::Lt => " < ",
        Comparison::Lte => " <= ",
        Comparison::Other(op) => return Err(StoreError::UnsupportedOperator(op.clone())),
    })
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryParams;

    #[test]
    fn operators_map_to_sql() {
        assert_eq!(sql_operator(&Comparison::Gte).unwrap(), " >= ");
        assert_eq!(sql_operator(&Comparison::Lt).unwrap(), " < ");
        assert!(matches!(
            sql_operator(&Comparison::Other("regex".into())),
            Err(StoreError::UnsupportedOperator(op)) if op == "regex"
        ));
    }

    fn compile(pairs: &[(&str, &str)]) -> Result<String, StoreError> {
        let params = QueryParams::from_pairs(pairs.iter().copied());
        list_sql(&ListQuery::from_params(&params)).map(|qb| qb.sql().to_string())
    }

    #[test]
    fn list_sql_defaults_to_newest_first() {
        assert_eq!(
            compile(&[]).unwrap(),
            format!(
                "SELECT {USER_COLUMNS} FROM users WHERE active = TRUE \
                 ORDER BY created_at DESC LIMIT $1 OFFSET $2"
            )
        );
    }

    #[test]
    fn list_sql_casts_filters_and_orders_keys() {
        let sql = compile(&[
            ("createdAt[gte]", "2024-01-01"),
            ("role", "manager"),
            ("__v[lt]", "3"),
            ("id", "8d6f4c1e-0000-4000-8000-000000000000"),
            ("sort", "-name,email"),
            ("page", "2"),
            ("limit", "5"),
        ])
        .unwrap();
        assert_eq!(
            sql,
            format!(
                "SELECT {USER_COLUMNS} FROM users WHERE active = TRUE \
                 AND version < $1::int4 \
                 AND created_at >= $2::timestamptz \
                 AND id = $3::uuid \
                 AND role = $4::text \
                 ORDER BY name DESC, email ASC LIMIT $5 OFFSET $6"
            )
        );
    }

    #[test]
    fn list_sql_rejects_unlisted_names() {
        assert!(matches!(compile(&[("price", "10")]), Err(StoreError::UnknownField(f)) if f == "price"));
        assert!(matches!(
            compile(&[("sort", "passwordHash")]),
            Err(StoreError::UnknownField(_))
        ));
        assert!(matches!(
            compile(&[("name[regex]", "^A")]),
            Err(StoreError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn huge_limits_saturate() {
        assert_eq!(to_i64(u64::MAX), i64::MAX);
        assert_eq!(to_i64(5), 5);
    }
}
