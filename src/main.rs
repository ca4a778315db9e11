use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patch::app::classifier::FailureClassifier;
use patch::app::dispatch::Dispatcher;
use patch::config::AppConfig;
use patch::infra::db::Db;
use patch::infra::devices::PgDeviceDirectory;
use patch::infra::gateway::HttpPushGateway;
use patch::infra::store::PgNotificationStore;
use patch::jobs;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    db.ping().await?;

    let store = PgNotificationStore::new(db.clone());
    let devices = PgDeviceDirectory::new(db.clone());
    let gateway = HttpPushGateway::new(&config)?;
    let dispatcher = Arc::new(Dispatcher::new(
        gateway,
        store,
        FailureClassifier::new(devices),
        config.retry_backoff_base,
    ));

    tracing::info!("notification worker starting");
    tokio::select! {
        result = jobs::retry::run(
            dispatcher.clone(),
            Duration::from_secs(config.retry_interval_seconds),
        ) => result?,
        result = jobs::receipts::run(
            dispatcher.clone(),
            Duration::from_secs(config.receipt_interval_seconds),
        ) => result?,
        result = jobs::cleanup::run(
            dispatcher.clone(),
            Duration::from_secs(config.cleanup_interval_seconds),
            config.stale_after_hours,
        ) => result?,
        _ = shutdown_signal() => {}
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
