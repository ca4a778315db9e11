use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::app::dispatch::Dispatcher;
use crate::domain::notification::NotificationRecord;
use crate::domain::push::Receipt;
use crate::infra::devices::DeviceDirectory;
use crate::infra::gateway::PushGateway;
use crate::infra::store::NotificationStore;

/// Recurring job: reconcile delivery receipts for outstanding success
/// tickets. Confirmed deliveries are deleted, transient receipt errors are
/// queued for the retry job, everything else is dropped.
pub async fn run<G, S, D>(dispatcher: Arc<Dispatcher<G, S, D>>, interval: Duration) -> Result<()>
where
    G: PushGateway,
    S: NotificationStore,
    D: DeviceDirectory,
{
    info!(interval_seconds = interval.as_secs(), "receipt job started");
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = tick(&dispatcher).await {
            error!(error = ?err, "receipt pass failed");
        }
    }
}

pub async fn tick<G, S, D>(dispatcher: &Dispatcher<G, S, D>) -> Result<()>
where
    G: PushGateway,
    S: NotificationStore,
    D: DeviceDirectory,
{
    let pending = dispatcher.store().find_receipt_pending().await?;
    if pending.is_empty() {
        return Ok(());
    }

    // Ticket ids are unique per pending record.
    let mut by_ticket: HashMap<String, NotificationRecord> = pending
        .into_iter()
        .filter_map(|record| record.success_ticket.clone().map(|id| (id, record)))
        .collect();
    debug!(count = by_ticket.len(), "checking delivery receipts");

    let chunks = dispatcher
        .gateway()
        .chunk_receipt_ids(by_ticket.keys().cloned().collect());

    for chunk in chunks {
        let receipts = dispatcher.gateway().fetch_receipts(&chunk).await?;

        let mut keep = Vec::new();
        let mut resolved = Vec::new();
        for (ticket_id, receipt) in receipts {
            // Ids with no receipt yet stay in the map and get polled again
            // next tick; unknown ids are not ours to act on.
            let Some(mut record) = by_ticket.remove(&ticket_id) else {
                continue;
            };

            match receipt {
                Receipt::Ok => resolved.push(record.id),
                Receipt::Error { details, .. } => {
                    let transient = dispatcher
                        .classifier()
                        .handle_receipt_error(&record, &details)
                        .await?;
                    if transient {
                        record.error_receipt = Some(details);
                        keep.push(record);
                    } else {
                        resolved.push(record.id);
                    }
                }
            }
        }

        // Flush this chunk's outcome before fetching the next, so an aborted
        // run never loses progress already acknowledged by the gateway.
        if !keep.is_empty() {
            dispatcher.store().bulk_upsert(&keep).await?;
        }
        for id in resolved {
            dispatcher.store().delete(id).await?;
        }
    }

    Ok(())
}
