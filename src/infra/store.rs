use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::{NotificationKind, NotificationRecord};
use crate::domain::push::ErrorDetails;
use crate::infra::db::Db;

/// Persistence contract for notification records. Upserts are
/// last-write-wins on the whole record; no cross-record transaction is
/// needed because each record's state transition is independent.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Records with a ticket or receipt error whose backoff window has passed.
    async fn find_retry_eligible(&self, now: OffsetDateTime) -> Result<Vec<NotificationRecord>>;

    /// Records holding a success ticket with no resolved receipt yet.
    async fn find_receipt_pending(&self) -> Result<Vec<NotificationRecord>>;

    async fn bulk_upsert(&self, records: &[NotificationRecord]) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Safety-net sweep: drop every record created before the cutoff,
    /// regardless of ticket or receipt state. Returns the purged count.
    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<u64>;
}

// Backed by the push_notifications table:
//   id uuid PK, kind text, recipient text, body text, payload jsonb,
//   sent_count int, next_send_at timestamptz, success_ticket text,
//   error_ticket jsonb, error_receipt jsonb, created_at timestamptz
#[derive(Clone)]
pub struct PgNotificationStore {
    db: Db,
}

const RECORD_COLUMNS: &str = "id, kind, recipient, body, payload, sent_count, \
     next_send_at, success_ticket, error_ticket, error_receipt, created_at";

impl PgNotificationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn record_from_row(row: &PgRow) -> Result<NotificationRecord> {
        let kind_raw: String = row.get("kind");
        let kind = NotificationKind::parse(&kind_raw)
            .ok_or_else(|| anyhow!("unknown notification kind: {}", kind_raw))?;

        Ok(NotificationRecord {
            id: row.get("id"),
            kind,
            to: row.get("recipient"),
            body: row.get("body"),
            payload: row.get("payload"),
            sent_count: row.get("sent_count"),
            next_send_at: row.get("next_send_at"),
            success_ticket: row.get("success_ticket"),
            error_ticket: details_from_column(row.get("error_ticket"))?,
            error_receipt: details_from_column(row.get("error_receipt"))?,
            created_at: row.get("created_at"),
        })
    }
}

fn details_from_column(value: Option<Value>) -> Result<Option<ErrorDetails>> {
    value
        .map(|value| serde_json::from_value(value).map_err(Into::into))
        .transpose()
}

fn details_to_column(details: &Option<ErrorDetails>) -> Result<Option<Value>> {
    details
        .as_ref()
        .map(|details| serde_json::to_value(details).map_err(Into::into))
        .transpose()
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn find_retry_eligible(&self, now: OffsetDateTime) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM push_notifications \
             WHERE (error_ticket IS NOT NULL OR error_receipt IS NOT NULL) \
               AND next_send_at <= $1",
        ))
        .bind(now)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn find_receipt_pending(&self) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM push_notifications \
             WHERE success_ticket IS NOT NULL AND error_receipt IS NULL",
        ))
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }

    async fn bulk_upsert(&self, records: &[NotificationRecord]) -> Result<()> {
        for record in records {
            sqlx::query(
                "INSERT INTO push_notifications \
                   (id, kind, recipient, body, payload, sent_count, next_send_at, \
                    success_ticket, error_ticket, error_receipt, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (id) DO UPDATE SET \
                   sent_count = EXCLUDED.sent_count, \
                   next_send_at = EXCLUDED.next_send_at, \
                   success_ticket = EXCLUDED.success_ticket, \
                   error_ticket = EXCLUDED.error_ticket, \
                   error_receipt = EXCLUDED.error_receipt",
            )
            .bind(record.id)
            .bind(record.kind.as_str())
            .bind(&record.to)
            .bind(&record.body)
            .bind(&record.payload)
            .bind(record.sent_count)
            .bind(record.next_send_at)
            .bind(&record.success_ticket)
            .bind(details_to_column(&record.error_ticket)?)
            .bind(details_to_column(&record.error_receipt)?)
            .bind(record.created_at)
            .execute(self.db.pool())
            .await?;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM push_notifications WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query("DELETE FROM push_notifications WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
