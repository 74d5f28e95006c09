use anyhow::Result;
use std::sync::Arc;
use tokio::signal;

use relay_common::core::registry::{JsonFileStore, SubscriberRegistry};
use relay_common::core::supervisor::InstanceSupervisor;
use relay_common::ingestors::SocketIoConnector;
use relay_common::retrieve::CodeApi;
use relay_common::{CodeTracker, CommandDesk};

mod relay_logic;
use relay_logic::{config, http, logger, sender};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    let settings = config::load_config();
    logger::setup_logging(&settings.log_dir, &settings.log_level, &settings.instance_id)?;
    log::info!(
        "Starting code relay '{}' (upstream {}, event '{}')",
        settings.instance_id,
        settings.relay.upstream.url,
        settings.relay.upstream.event_name
    );

    let supervisor = Arc::new(InstanceSupervisor::new());
    let registry = Arc::new(SubscriberRegistry::new(Box::new(JsonFileStore::new(
        &settings.subscribers_file,
    ))));

    let outbound = sender::build_sender(settings.outbound_url.as_deref())?;
    let lookup = Arc::new(CodeApi::new(&settings.api_base_url)?);
    let desk = Arc::new(CommandDesk::new(
        registry.clone(),
        lookup,
        outbound.clone(),
        settings.site_url.clone(),
    ));

    let tracker = CodeTracker::start(
        &settings.instance_id,
        &settings.relay,
        Arc::new(SocketIoConnector::new(settings.relay.upstream.clone())),
        supervisor.clone(),
        registry.clone(),
        outbound,
    )
    .await;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let app_state = http::AppState {
        instance_id: settings.instance_id.clone(),
        client: tracker.client().clone(),
        stats: tracker.stats_handle(),
        desk,
    };
    let http_handle = tokio::spawn(http::run(settings.port, app_state, shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = wait_for_sigterm() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    let _ = shutdown_tx.send(());
    match http_handle.await {
        Ok(Err(e)) => log::error!("HTTP surface failed: {:#}", e),
        Err(e) => log::error!("HTTP task panicked: {}", e),
        Ok(Ok(())) => {}
    }

    let stats = tracker.shutdown().await;
    log::info!(
        "Shutdown complete. received={} malformed={} duplicates={} deliveries={} failures={}",
        stats.received,
        stats.malformed,
        stats.duplicates,
        stats.deliveries,
        stats.delivery_failures
    );
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}
