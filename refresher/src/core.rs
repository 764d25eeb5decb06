use std::sync::Arc;
use std::time::Duration;

use config::shared::{
    HistoryStoreConfig, NotificationConfig, PgConnectionConfig, RefreshConfig, RefresherConfig,
    ServicesConfig,
};
use postgres::db::connect_to_history_database;
use refresh::cleanup::{CleanupOutcome, DataRefreshCleanupService};
use refresh::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use refresh::error::ErrorKind;
use refresh::notification::{LoggingNotificationSender, NotificationSender};
use refresh::orchestrator::{DataRefreshOrchestrator, RefreshOutcome};
use refresh::refresh_error;
use refresh::runner::DataRefreshRunner;
use refresh::store::BoxedHistoryStore;
use refresh::store::memory::MemoryHistoryStore;
use refresh::store::postgres::PostgresHistoryStore;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::Command;
use crate::error::RefresherResult;
use crate::migrations::migrate_history_store;
use crate::notification::WebhookNotificationSender;
use crate::services::DataServicesClient;

/// Builds the refresh pipeline from `refresher_config` and executes `command` with it.
///
/// Ctrl+C and SIGTERM stop a running refresh at its next stage boundary, after which it is torn
/// down and recorded as failed.
pub async fn start_refresher_with_config(
    refresher_config: RefresherConfig,
    command: Command,
) -> RefresherResult<()> {
    info!(?command, "starting refresher");

    log_config(&refresher_config);

    let store = init_history_store(&refresher_config.history_store).await?;
    let services = DataServicesClient::new(&refresher_config.services)?;
    let notification_sender = init_notification_sender(refresher_config.notification.as_ref())?;

    let runner = DataRefreshRunner::new(
        refresher_config.refresh.clone(),
        store.clone(),
        Arc::new(services.clone()),
        Arc::new(services.clone()),
        Arc::new(services.clone()),
        services.stage_workers(),
        notification_sender.clone(),
    );
    let orchestrator = DataRefreshOrchestrator::new(
        store.clone(),
        Arc::new(services.clone()),
        Arc::new(services.clone()),
        Arc::new(services.clone()),
        notification_sender.clone(),
        runner,
    );

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let shutdown_handle = spawn_shutdown_listener(shutdown_tx);

    let result = match command {
        Command::Run => {
            run_schedule(
                &orchestrator,
                refresher_config.schedule.interval(),
                shutdown_rx,
            )
            .await;
            Ok(())
        }
        Command::Refresh => {
            check_outcome(orchestrator.refresh_data_if_necessary(shutdown_rx).await)
        }
        Command::ForceRefresh => check_outcome(orchestrator.force_refresh(shutdown_rx).await),
        Command::Continue => check_outcome(orchestrator.continue_refresh(shutdown_rx).await),
        Command::Cleanup { force } => {
            let cleanup = DataRefreshCleanupService::new(
                refresher_config.refresh.clone(),
                store,
                Arc::new(services.clone()),
                Arc::new(services),
                notification_sender,
            );

            let outcome = if force {
                cleanup.run_forced_data_refresh_cleanup().await
            } else {
                cleanup.run_data_refresh_cleanup().await
            };

            check_cleanup_outcome(outcome)
        }
    };

    // The listener only finishes on its own when a signal arrived.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result
}

/// Continues an interrupted refresh and then checks for new nomenclature versions on every tick.
///
/// Failed refreshes are already alerted by the orchestrator, so the schedule keeps going.
async fn run_schedule(
    orchestrator: &DataRefreshOrchestrator,
    interval: Duration,
    mut shutdown_rx: ShutdownRx,
) {
    let outcome = orchestrator.continue_refresh(shutdown_rx.clone()).await;
    log_outcome(&outcome);
    if outcome == RefreshOutcome::Cancelled {
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.wait_for_shutdown() => {
                info!("shutdown requested, stopping refresh schedule");
                return;
            }
            _ = ticker.tick() => {}
        }

        let outcome = orchestrator
            .refresh_data_if_necessary(shutdown_rx.clone())
            .await;
        log_outcome(&outcome);

        if outcome == RefreshOutcome::Cancelled {
            return;
        }
    }
}

fn check_outcome(outcome: RefreshOutcome) -> RefresherResult<()> {
    log_outcome(&outcome);

    match outcome {
        RefreshOutcome::Failed(err) => Err(err.into()),
        _ => Ok(()),
    }
}

fn check_cleanup_outcome(outcome: CleanupOutcome) -> RefresherResult<()> {
    info!(
        cleaned_up = outcome.cleaned_up.len(),
        skipped = outcome.skipped.len(),
        failed = outcome.failed.len(),
        "data refresh cleanup finished"
    );

    if !outcome.failed.is_empty() {
        return Err(refresh_error!(
            ErrorKind::DatabaseResizeFailed,
            "Data refresh cleanup failed",
            format!(
                "{} data refreshes could not be torn down and are still in progress: {:?}",
                outcome.failed.len(),
                outcome.failed
            )
        )
        .into());
    }

    Ok(())
}

fn log_outcome(outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::UpToDate => info!("no data refresh needed"),
        RefreshOutcome::AlreadyInProgress => info!("data refresh already in progress"),
        RefreshOutcome::NothingToContinue => debug!("no data refresh to continue"),
        RefreshOutcome::Succeeded {
            nomenclature_version,
        } => info!(%nomenclature_version, "data refresh succeeded"),
        RefreshOutcome::Failed(err) => error!(error = %err, "data refresh failed"),
        RefreshOutcome::Cancelled => warn!("data refresh cancelled and torn down"),
    }
}

async fn init_history_store(config: &HistoryStoreConfig) -> RefresherResult<BoxedHistoryStore> {
    match config {
        HistoryStoreConfig::Memory => {
            warn!("using the in-memory history store, refresh progress is lost on restart");

            Ok(Arc::new(MemoryHistoryStore::new()))
        }
        HistoryStoreConfig::Postgres {
            connection,
            max_connections,
        } => {
            migrate_history_store(connection).await?;
            let pool = connect_to_history_database(connection, *max_connections).await?;

            Ok(Arc::new(PostgresHistoryStore::new(pool)))
        }
    }
}

fn init_notification_sender(
    config: Option<&NotificationConfig>,
) -> RefresherResult<Arc<dyn NotificationSender>> {
    match config {
        Some(config) => Ok(Arc::new(WebhookNotificationSender::new(config)?)),
        None => {
            warn!("no notification webhook configured, alerts are only logged");

            Ok(Arc::new(LoggingNotificationSender))
        }
    }
}

/// Listens for SIGINT and SIGTERM and requests shutdown once either arrives.
fn spawn_shutdown_listener(shutdown_tx: ShutdownTx) -> JoinHandle<()> {
    tokio::spawn(async move {
        let sigterm = async {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to register sigterm handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("sigint (ctrl+c) received, shutting down refresher");
            }
            _ = sigterm => {
                info!("sigterm received, shutting down refresher");
            }
        }

        if let Err(err) = shutdown_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
        }
    })
}

fn log_config(config: &RefresherConfig) {
    log_refresh_config(&config.refresh);
    debug!(
        interval_secs = config.schedule.interval_secs,
        "schedule config"
    );
    log_services_config(&config.services);

    match &config.history_store {
        HistoryStoreConfig::Memory => debug!("using memory history store"),
        HistoryStoreConfig::Postgres {
            connection,
            max_connections,
        } => log_pg_connection_config(connection, *max_connections),
    }

    if let Some(notification) = &config.notification {
        debug!(
            webhook_url = notification.webhook_url,
            timeout_ms = notification.timeout_ms,
            "notification config"
        );
    }
}

fn log_refresh_config(config: &RefreshConfig) {
    debug!(
        refresh_tier = config.refresh_tier,
        active_tier = config.active_tier,
        dormant_tier = config.dormant_tier,
        heartbeat_interval_ms = config.heartbeat_interval_ms,
        stale_heartbeat_timeout_ms = config.stale_heartbeat_timeout_ms,
        "refresh config"
    );
}

fn log_services_config(config: &ServicesConfig) {
    debug!(
        base_url = config.base_url,
        timeout_ms = config.timeout_ms,
        "data services config"
    );
}

fn log_pg_connection_config(config: &PgConnectionConfig, max_connections: u32) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        max_connections,
        "history store postgres connection config",
    );
}
