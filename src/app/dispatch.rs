use anyhow::{anyhow, Result};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::app::classifier::FailureClassifier;
use crate::domain::notification::{NotificationInput, NotificationRecord};
use crate::domain::push::{PushMessage, Ticket};
use crate::infra::devices::DeviceDirectory;
use crate::infra::gateway::PushGateway;
use crate::infra::store::NotificationStore;

/// Records annotated with their latest ticket, split by ticket status.
pub struct SendOutcome {
    pub successful: Vec<NotificationRecord>,
    pub failed: Vec<NotificationRecord>,
}

/// Converts outbound notifications into gateway messages, submits them, and
/// turns the resulting tickets into persisted retry state. Collaborators are
/// constructor-injected so the engine can be driven directly in tests.
pub struct Dispatcher<G, S, D> {
    gateway: G,
    store: S,
    classifier: FailureClassifier<D>,
    backoff_base: u32,
}

impl<G, S, D> Dispatcher<G, S, D>
where
    G: PushGateway,
    S: NotificationStore,
    D: DeviceDirectory,
{
    pub fn new(gateway: G, store: S, classifier: FailureClassifier<D>, backoff_base: u32) -> Self {
        Self {
            gateway,
            store,
            classifier,
            backoff_base,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn classifier(&self) -> &FailureClassifier<D> {
        &self.classifier
    }

    pub async fn send(&self, notification: NotificationInput) -> Result<()> {
        self.send_bulk(vec![notification]).await
    }

    /// Fire-and-forget from the caller's perspective: outcomes are absorbed
    /// into persisted state, never reported back. Only a hard infrastructure
    /// failure (store or gateway unreachable) propagates.
    pub async fn send_bulk(&self, notifications: Vec<NotificationInput>) -> Result<()> {
        if notifications.is_empty() {
            return Ok(());
        }

        let now = OffsetDateTime::now_utc();
        let records = notifications
            .into_iter()
            .map(|input| NotificationRecord::materialize(input, now))
            .collect();

        let outcome = self.send_records(records).await?;
        let classified = self
            .classifier
            .handle_non_transient_ticket_errors(outcome.failed)
            .await?;

        info!(
            sent = outcome.successful.len(),
            retrying = classified.transient.len(),
            dropped = classified.non_transient.len(),
            "notification batch dispatched"
        );

        // Successes await receipt confirmation; transient failures await
        // their backoff slot. Non-transient failures are already resolved
        // and never hit the store.
        let mut keep = outcome.successful;
        keep.extend(classified.transient);
        self.store.bulk_upsert(&keep).await?;

        Ok(())
    }

    /// Shared batch-send routine, also driven by the retry job: convert each
    /// record to a gateway message, submit chunk by chunk, and fold every
    /// ticket back into its record strictly by position.
    pub async fn send_records(&self, records: Vec<NotificationRecord>) -> Result<SendOutcome> {
        let messages: Vec<PushMessage> = records
            .iter()
            .map(NotificationRecord::to_push_message)
            .collect();
        let chunks = self.gateway.chunk_messages(messages);

        let mut remaining = records.into_iter();
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        // Chunks go out one at a time; the gateway rate-limits bursts.
        for chunk in chunks {
            let tickets = self.gateway.send_batch(&chunk).await?;
            if tickets.len() != chunk.len() {
                return Err(anyhow!(
                    "gateway returned {} tickets for {} messages",
                    tickets.len(),
                    chunk.len()
                ));
            }

            let now = OffsetDateTime::now_utc();
            for ticket in tickets {
                let mut record = remaining
                    .next()
                    .ok_or_else(|| anyhow!("more tickets than records in batch"))?;
                record.record_attempt(&ticket, now, self.backoff_base);
                match ticket {
                    Ticket::Ok { .. } => successful.push(record),
                    Ticket::Error { .. } => failed.push(record),
                }
            }
        }

        debug!(
            successful = successful.len(),
            failed = failed.len(),
            "batch send complete"
        );
        Ok(SendOutcome { successful, failed })
    }
}
