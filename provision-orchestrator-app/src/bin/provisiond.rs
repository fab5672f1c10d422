//! `provisiond`: provisioning daemon
//!
//! Loads the deployment settings, opens the `SQLite` store, activates the configured
//! products and runs reconciliation until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use provision_orchestrator_app::adapters::SqliteStore;
use provision_orchestrator_app::config::Settings;
use provision_orchestrator_app::AppStateBuilder;
use provision_orchestrator_core::traits::BroadcastEventSink;
use provision_orchestrator_core::types::ProvisioningEvent;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "provisiond", version, about = "Provision Orchestrator daemon")]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, default_value = "provisiond.toml")]
    config: PathBuf,

    /// Run one reconciliation pass, print the report and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let settings = if cli.config.exists() {
        match Settings::load(&cli.config) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("Failed to load {}: {e}", cli.config.display());
                return ExitCode::FAILURE;
            }
        }
    } else {
        tracing::warn!("{} not found, using defaults", cli.config.display());
        Settings::default()
    };

    let store = match SqliteStore::new(&settings.database.path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Store opened at {}", settings.database.path.display());

    let events = Arc::new(BroadcastEventSink::new(EVENT_CAPACITY));
    tokio::spawn(forward_events(events.subscribe()));

    let state = match AppStateBuilder::new()
        .service_repository(store.clone())
        .call_log_repository(store)
        .event_sink(events)
        .settings(settings.orchestrator.clone())
        .build()
    {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to build application state: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = state.run_startup(&settings).await {
        tracing::error!("Startup failed: {e}");
        return ExitCode::FAILURE;
    }

    match state.admin_service.open_calls().await {
        Ok(open) if !open.is_empty() => tracing::warn!(
            "{} module call(s) never completed; their remote effect is unknown",
            open.len()
        ),
        Ok(_) => {}
        Err(e) => tracing::error!("Failed to list open calls: {e}"),
    }

    if cli.once {
        return match state.reconciliation.run_pass().await {
            Ok(report) => {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(e) => tracing::error!("Failed to render report: {e}"),
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Reconciliation pass failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Arc::clone(&state.reconciliation);
    let sweep = tokio::spawn(async move { scheduler.run_forever(shutdown_rx).await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweep.await {
        tracing::error!("Reconciliation task ended abnormally: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Mail delivery hooks in here; the daemon only traces what would be sent.
async fn forward_events(mut rx: broadcast::Receiver<ProvisioningEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::debug!(service_id = event.service_id(), ?event, "event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event forwarder lagged, {skipped} event(s) dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
