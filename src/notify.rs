use async_trait::async_trait;
use tracing::info;

use crate::users::repo_types::User;

/// Outbound account notifications (email in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_welcome(&self, user: &User) -> anyhow::Result<()>;
    async fn send_password_reset(&self, user: &User, reset_url: &str) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_welcome(&self, user: &User) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, "welcome notification");
        Ok(())
    }

    async fn send_password_reset(&self, user: &User, reset_url: &str) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, %reset_url, "password reset notification");
        Ok(())
    }
}
