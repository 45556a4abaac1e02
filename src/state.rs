use crate::auth::password::Hasher;
use crate::config::AppConfig;
use crate::notify::{LogNotifier, Notifier};
use crate::users::{memory::MemoryUserStore, repo::PgUserStore, repo::UserStore};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub notifier: Arc<dyn Notifier>,
    pub hasher: Hasher,
    /// Present when backed by Postgres; used for migrations.
    pub db: Option<PgPool>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (store, db) = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;
                let store = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
                (store, Some(db))
            }
            None => {
                tracing::warn!("DATABASE_URL not set; using in-memory user store");
                (Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>, None)
            }
        };

        Self::from_parts(store, config, Arc::new(LogNotifier), db)
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        notifier: Arc<dyn Notifier>,
        db: Option<PgPool>,
    ) -> anyhow::Result<Self> {
        let hasher = Hasher::new(&config.password)?;
        Ok(Self {
            store,
            config,
            notifier,
            hasher,
            db,
        })
    }

    /// In-memory state with cheap hashing for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_notifier(Arc::new(LogNotifier))
    }

    #[cfg(test)]
    pub fn fake_with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                cookie_ttl_days: 1,
            },
            password: crate::config::PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            reset_token_ttl_minutes: 10,
            public_base_url: None,
        });

        Self::from_parts(Arc::new(MemoryUserStore::new()), config, notifier, None)
            .expect("test hashing params are valid")
    }
}
