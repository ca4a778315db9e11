use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info};

use crate::app::dispatch::Dispatcher;
use crate::infra::devices::DeviceDirectory;
use crate::infra::gateway::PushGateway;
use crate::infra::store::NotificationStore;

/// Recurring job: re-attempt delivery for records whose backoff window has
/// elapsed. A failed pass is logged and retried on the next tick.
pub async fn run<G, S, D>(dispatcher: Arc<Dispatcher<G, S, D>>, interval: Duration) -> Result<()>
where
    G: PushGateway,
    S: NotificationStore,
    D: DeviceDirectory,
{
    info!(interval_seconds = interval.as_secs(), "retry job started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = tick(&dispatcher).await {
            error!(error = ?err, "retry pass failed");
        }
    }
}

/// One retry pass: resend everything due, reclassify the failures, persist
/// successes and still-transient failures, delete the rest.
pub async fn tick<G, S, D>(dispatcher: &Dispatcher<G, S, D>) -> Result<()>
where
    G: PushGateway,
    S: NotificationStore,
    D: DeviceDirectory,
{
    let now = OffsetDateTime::now_utc();
    let due = dispatcher.store().find_retry_eligible(now).await?;
    if due.is_empty() {
        return Ok(());
    }
    debug!(count = due.len(), "retrying transient failures");

    let outcome = dispatcher.send_records(due).await?;
    let classified = dispatcher
        .classifier()
        .handle_non_transient_ticket_errors(outcome.failed)
        .await?;

    let mut keep = outcome.successful;
    keep.extend(classified.transient);
    dispatcher.store().bulk_upsert(&keep).await?;

    for record in &classified.non_transient {
        dispatcher.store().delete(record.id).await?;
    }

    Ok(())
}
