// ABOUTME: Shared D-Bus names, wire types, and proxy traits between the podpair daemon and its clients.
// ABOUTME: Covers the pairing session interface served by the daemon and the pod comms service it consumes.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod presentation;

pub use presentation::{ActivityIndicator, DeactivationPrompt, Presentation, PrimaryAction, project};

/// Well-known bus name the daemon registers on the session bus.
pub const BUS_NAME: &str = "io.github.podpair.Daemon";

/// Object path the pairing interface is served at.
pub const OBJECT_PATH: &str = "/io/github/podpair/Pairing";

/// Default bus name of the external pod communications service.
pub const POD_COMMS_SERVICE: &str = "io.github.podpair.PodComms";

/// Default object path of the external pod communications service.
pub const POD_COMMS_PATH: &str = "/io/github/podpair/PodComms";

/// D-Bus error names the pod comms service uses to report failures.
pub mod pod_comms_errors {
    pub const POD_FAULT: &str = "io.github.podpair.PodComms.Error.PodFault";
    pub const TIMEOUT: &str = "io.github.podpair.PodComms.Error.Timeout";
    pub const CANCELLED: &str = "io.github.podpair.PodComms.Error.Cancelled";
    pub const COMMUNICATION: &str = "io.github.podpair.PodComms.Error.Communication";
}

/// Pairing state as exposed over D-Bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingPhase {
    Initial,
    Pairing,
    Priming,
    Fault,
    Ready,
}

impl fmt::Display for PairingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingPhase::Initial => write!(f, "Initial"),
            PairingPhase::Pairing => write!(f, "Pairing"),
            PairingPhase::Priming => write!(f, "Priming"),
            PairingPhase::Fault => write!(f, "Fault"),
            PairingPhase::Ready => write!(f, "Ready"),
        }
    }
}

impl std::str::FromStr for PairingPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initial" => Ok(PairingPhase::Initial),
            "Pairing" => Ok(PairingPhase::Pairing),
            "Priming" => Ok(PairingPhase::Priming),
            "Fault" => Ok(PairingPhase::Fault),
            "Ready" => Ok(PairingPhase::Ready),
            other => Err(format!("Unknown pairing phase: {other}")),
        }
    }
}

/// How a pairing session ended, as carried by the `SetupFinished` signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SetupOutcome {
    /// Pod is primed and the owning workflow moves past setup.
    HandedOff,
    /// Pod must be deactivated and replaced.
    ReplacePod,
    /// Setup was abandoned before a pod identity existed.
    Cancelled,
}

impl fmt::Display for SetupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupOutcome::HandedOff => write!(f, "handed-off"),
            SetupOutcome::ReplacePod => write!(f, "replace-pod"),
            SetupOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for SetupOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "handed-off" => Ok(SetupOutcome::HandedOff),
            "replace-pod" => Ok(SetupOutcome::ReplacePod),
            "cancelled" => Ok(SetupOutcome::Cancelled),
            other => Err(format!("Unknown setup outcome: {other}")),
        }
    }
}

/// D-Bus proxy for presentation clients driving a pairing session.
///
/// The daemon implements the server side of this interface using
/// `zbus::interface` on a struct that reads the session snapshot.
#[zbus::proxy(
    interface = "io.github.podpair.Pairing1",
    default_service = "io.github.podpair.Daemon",
    default_path = "/io/github/podpair/Pairing"
)]
pub trait PairingSession {
    /// Current pairing phase as a string.
    #[zbus(property)]
    fn state(&self) -> zbus::Result<String>;

    /// Most recent error message, empty when no error.
    #[zbus(property)]
    fn last_error(&self) -> zbus::Result<String>;

    /// Unix time (seconds) priming finishes, 0 when not priming.
    #[zbus(property)]
    fn priming_finishes_at(&self) -> zbus::Result<u64>;

    /// Whether list/row interactions should be suppressed.
    #[zbus(property)]
    fn interactions_disabled(&self) -> zbus::Result<bool>;

    /// Whether a deactivation confirmation is pending.
    #[zbus(property)]
    fn awaiting_confirmation(&self) -> zbus::Result<bool>;

    /// Screen projection serialized as JSON.
    #[zbus(property)]
    fn presentation(&self) -> zbus::Result<String>;

    /// Primary button pressed.
    fn continue_pressed(&self) -> zbus::Result<()>;

    /// Cancel button pressed.
    fn cancel_pressed(&self) -> zbus::Result<()>;

    /// User accepted the deactivation prompt.
    fn confirm_deactivation(&self) -> zbus::Result<()>;

    /// User backed out of the deactivation prompt.
    fn dismiss_deactivation(&self) -> zbus::Result<()>;

    /// Shut down the daemon process.
    fn quit(&self) -> zbus::Result<()>;

    /// Emitted once when the session ends.
    #[zbus(signal)]
    fn setup_finished(outcome: &str) -> zbus::Result<()>;
}

/// D-Bus proxy for the external pod communications service.
///
/// Times are unix seconds. Failures are reported as D-Bus errors named
/// in [`pod_comms_errors`].
#[zbus::proxy(
    interface = "io.github.podpair.PodComms1",
    default_service = "io.github.podpair.PodComms",
    default_path = "/io/github/podpair/PodComms"
)]
pub trait PodComms {
    /// Whether the attached pod is still priming, and when it finishes.
    fn priming_status(&self) -> zbus::Result<(bool, u64)>;

    /// Pair with the pod and start priming. Returns the priming finish time.
    fn pair_and_prime(&self) -> zbus::Result<u64>;

    /// Whether a pod identity already exists on this device handle.
    fn pod_identity_present(&self) -> zbus::Result<bool>;
}
