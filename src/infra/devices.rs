use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::infra::db::Db;

/// Resolves "destination gone" failures by clearing the dead push token.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Clear the push token for a destination the gateway reports as no
    /// longer registered. Must be a no-op when the token is already cleared.
    async fn disable_destination(&self, token: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct PgDeviceDirectory {
    db: Db,
}

impl PgDeviceDirectory {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceDirectory for PgDeviceDirectory {
    async fn disable_destination(&self, token: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE devices \
             SET push_token = NULL, disabled_at = now() \
             WHERE push_token = $1",
        )
        .bind(token)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            info!(devices = result.rows_affected(), "disabled dead push token");
        }
        Ok(())
    }
}
