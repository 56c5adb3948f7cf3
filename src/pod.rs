// ABOUTME: Interface the pairing session needs from the pod hardware layer.
// ABOUTME: Backends (D-Bus pod comms, simulator) implement it; the session only awaits it.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::PodError;

/// Answer to "is this pod still priming, and until when?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimingStatus {
    NotPriming,
    Priming { finish_time: Instant },
}

impl PrimingStatus {
    /// Build from the raw pair the hardware layer reports. A pod claiming to
    /// prime without a finish time is treated as not priming.
    pub fn from_parts(still_priming: bool, finish_time: Option<Instant>) -> Self {
        match (still_priming, finish_time) {
            (true, Some(finish_time)) => PrimingStatus::Priming { finish_time },
            _ => PrimingStatus::NotPriming,
        }
    }
}

/// Asynchronous operations on the attached pod.
#[async_trait]
pub trait PodLink: Send + Sync {
    /// Query whether the pod is still priming. Used once per attachment.
    async fn priming_status(&self) -> Result<PrimingStatus, PodError>;

    /// Pair with the pod and start priming. Resolves with the instant
    /// priming completes.
    async fn pair_and_prime(&self) -> Result<Instant, PodError>;

    /// Whether a pod identity already exists on this device handle.
    async fn pod_identity_present(&self) -> bool;
}
