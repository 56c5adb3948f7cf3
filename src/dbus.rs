// ABOUTME: D-Bus interface exposing the pairing session to presentation clients.
// ABOUTME: Properties mirror the session snapshot; methods forward user intents into the session.

use std::sync::Arc;
use std::time::SystemTime;

use podpair_ipc::SetupOutcome;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use crate::comms::unix_from_instant;
use crate::session::SessionHandle;
use crate::state::{Intent, PairingState, Snapshot};

/// D-Bus interface implementation served by the daemon.
pub struct PairingInterface {
    snapshots: watch::Receiver<Snapshot>,
    handle: SessionHandle,
    shutdown: Arc<Notify>,
}

impl PairingInterface {
    pub fn new(
        snapshots: watch::Receiver<Snapshot>,
        handle: SessionHandle,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            snapshots,
            handle,
            shutdown,
        }
    }

    fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    fn forward(&self, intent: Intent) -> zbus::fdo::Result<()> {
        if self.handle.send(intent) {
            Ok(())
        } else {
            Err(zbus::fdo::Error::Failed(
                "Pairing session has already finished".to_string(),
            ))
        }
    }

    /// Emit PropertiesChanged for every property derived from the snapshot.
    pub async fn notify_snapshot(connection: &zbus::Connection) {
        let Ok(iface_ref) = connection
            .object_server()
            .interface::<_, PairingInterface>(podpair_ipc::OBJECT_PATH)
            .await
        else {
            return;
        };
        let emitter = iface_ref.signal_emitter();
        let iface = iface_ref.get().await;
        let _ = iface.state_changed(emitter).await;
        let _ = iface.last_error_changed(emitter).await;
        let _ = iface.priming_finishes_at_changed(emitter).await;
        let _ = iface.interactions_disabled_changed(emitter).await;
        let _ = iface.awaiting_confirmation_changed(emitter).await;
        let _ = iface.presentation_changed(emitter).await;
    }

    pub async fn notify_finished(connection: &zbus::Connection, outcome: SetupOutcome) {
        let Ok(iface_ref) = connection
            .object_server()
            .interface::<_, PairingInterface>(podpair_ipc::OBJECT_PATH)
            .await
        else {
            return;
        };
        if let Err(e) =
            PairingInterface::setup_finished(iface_ref.signal_emitter(), &outcome.to_string()).await
        {
            tracing::warn!("Failed to emit SetupFinished: {e}");
        }
    }
}

fn finishes_at_unix(state: PairingState) -> u64 {
    match state {
        PairingState::Priming { finish_time } => {
            unix_from_instant(finish_time, SystemTime::now(), Instant::now())
        }
        _ => 0,
    }
}

#[zbus::interface(name = "io.github.podpair.Pairing1")]
impl PairingInterface {
    #[zbus(property)]
    fn state(&self) -> String {
        self.snapshot().state.to_string()
    }

    #[zbus(property)]
    fn last_error(&self) -> String {
        self.snapshot().last_error.unwrap_or_default()
    }

    #[zbus(property)]
    fn priming_finishes_at(&self) -> u64 {
        finishes_at_unix(self.snapshot().state)
    }

    #[zbus(property)]
    fn interactions_disabled(&self) -> bool {
        self.snapshot().state.interactions_disabled()
    }

    #[zbus(property)]
    fn awaiting_confirmation(&self) -> bool {
        self.snapshot().awaiting_confirmation
    }

    #[zbus(property)]
    fn presentation(&self) -> String {
        let snapshot = self.snapshot();
        let view = podpair_ipc::project(
            snapshot.state.phase(),
            finishes_at_unix(snapshot.state),
            snapshot.last_error.as_deref(),
            snapshot.awaiting_confirmation,
        );
        serde_json::to_string(&view).unwrap_or_default()
    }

    async fn continue_pressed(&self) -> zbus::fdo::Result<()> {
        self.forward(Intent::Continue)
    }

    async fn cancel_pressed(&self) -> zbus::fdo::Result<()> {
        self.forward(Intent::Cancel)
    }

    async fn confirm_deactivation(&self) -> zbus::fdo::Result<()> {
        self.forward(Intent::ConfirmDeactivation)
    }

    async fn dismiss_deactivation(&self) -> zbus::fdo::Result<()> {
        self.forward(Intent::DismissDeactivation)
    }

    async fn quit(&self) -> zbus::fdo::Result<()> {
        tracing::info!("Quit requested via D-Bus");
        self.shutdown.notify_one();
        Ok(())
    }

    #[zbus(signal)]
    async fn setup_finished(
        ctxt: &zbus::object_server::SignalEmitter<'_>,
        outcome: &str,
    ) -> zbus::Result<()>;
}
