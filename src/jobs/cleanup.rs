use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::app::dispatch::Dispatcher;
use crate::infra::devices::DeviceDirectory;
use crate::infra::gateway::PushGateway;
use crate::infra::store::NotificationStore;

/// Recurring job: purge records older than the staleness window regardless
/// of state. This is the backstop for records the send and receipt flows
/// can never resolve, e.g. when the gateway is permanently unreachable.
pub async fn run<G, S, D>(
    dispatcher: Arc<Dispatcher<G, S, D>>,
    interval: Duration,
    stale_after_hours: i64,
) -> Result<()>
where
    G: PushGateway,
    S: NotificationStore,
    D: DeviceDirectory,
{
    info!(
        interval_seconds = interval.as_secs(),
        stale_after_hours, "cleanup job started"
    );
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = tick(dispatcher.store(), stale_after_hours).await {
            error!(error = ?err, "cleanup pass failed");
        }
    }
}

pub async fn tick<S: NotificationStore>(store: &S, stale_after_hours: i64) -> Result<()> {
    let cutoff = OffsetDateTime::now_utc() - time::Duration::hours(stale_after_hours);
    let purged = store.delete_older_than(cutoff).await?;
    if purged > 0 {
        info!(purged, "purged stale notifications");
    }
    Ok(())
}
