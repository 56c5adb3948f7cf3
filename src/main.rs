// ABOUTME: Entry point for the podpair pairing and priming daemon.
// ABOUTME: Wires the configured pod backend, the pairing session, and its D-Bus interface together.

mod comms;
mod config;
mod dbus;
mod error;
mod pod;
mod scheduler;
mod session;
mod simulator;
mod state;

use std::sync::Arc;

use tokio::sync::{Notify, watch};

use comms::PodCommsLink;
use config::{Config, PodBackend};
use dbus::PairingInterface;
use pod::PodLink;
use scheduler::TokioScheduler;
use session::Session;
use simulator::SimulatedPod;
use state::Snapshot;

type DynError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    // Register signal handlers early so they work during startup
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = run() => {
            if let Err(e) = result {
                tracing::error!("Fatal: {e}");
                std::process::exit(1);
            }
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down");
        }
    }
}

async fn run() -> Result<(), DynError> {
    let config = Config::load()?;
    tracing::info!("Configuration loaded");

    let connection = zbus::Connection::session().await?;

    let pod: Arc<dyn PodLink> = match config.pod.backend {
        PodBackend::PodComms => Arc::new(PodCommsLink::connect(&connection, &config.pod.comms).await?),
        PodBackend::Simulator => {
            tracing::warn!("Using the simulated pod; no hardware will be paired");
            Arc::new(SimulatedPod::new(&config.pod.simulator))
        }
    };

    let (session, handle, snapshots) = Session::new(pod, Arc::new(TokioScheduler));
    let shutdown = Arc::new(Notify::new());

    // Serve the D-Bus interface for presentation clients
    connection
        .object_server()
        .at(
            podpair_ipc::OBJECT_PATH,
            PairingInterface::new(snapshots.clone(), handle, shutdown.clone()),
        )
        .await?;
    connection.request_name(podpair_ipc::BUS_NAME).await?;
    tracing::info!("D-Bus interface registered at {}", podpair_ipc::BUS_NAME);

    let forwarder = tokio::spawn(forward_snapshots(snapshots, connection.clone()));

    let outcome = tokio::select! {
        outcome = session.run() => outcome,
        _ = shutdown.notified() => {
            tracing::info!("Shutdown requested via D-Bus");
            forwarder.abort();
            return Ok(());
        }
    };

    // The session's sender is gone now, so the forwarder drains and exits.
    let _ = forwarder.await;
    PairingInterface::notify_finished(&connection, outcome).await;
    Ok(())
}

/// Emit PropertiesChanged whenever the session publishes a new snapshot.
async fn forward_snapshots(mut snapshots: watch::Receiver<Snapshot>, connection: zbus::Connection) {
    while snapshots.changed().await.is_ok() {
        let state = snapshots.borrow_and_update().state;
        tracing::debug!("Publishing snapshot in state {state}");
        PairingInterface::notify_snapshot(&connection).await;
    }
}
