// ABOUTME: Pod hardware backend that calls the external pod comms service over D-Bus.
// ABOUTME: Converts unix-second finish times to monotonic instants and D-Bus error names to pod errors.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use podpair_ipc::{PodCommsProxy, pod_comms_errors};
use tokio::time::Instant;

use crate::config::CommsConfig;
use crate::error::PodError;
use crate::pod::{PodLink, PrimingStatus};

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Holds the proxy to the radio stack's pod comms service.
pub struct PodCommsLink {
    proxy: PodCommsProxy<'static>,
}

impl PodCommsLink {
    pub async fn connect(connection: &zbus::Connection, config: &CommsConfig) -> Result<Self, DynError> {
        let proxy = PodCommsProxy::builder(connection)
            .destination(config.service.clone())?
            .path(config.path.clone())?
            .build()
            .await?;

        tracing::info!("Using pod comms service {} at {}", config.service, config.path);
        Ok(Self { proxy })
    }
}

#[async_trait]
impl PodLink for PodCommsLink {
    async fn priming_status(&self) -> Result<PrimingStatus, PodError> {
        let (still_priming, finish_unix) = self.proxy.priming_status().await.map_err(map_error)?;
        let finish_time = (finish_unix > 0)
            .then(|| instant_from_unix(finish_unix, SystemTime::now(), Instant::now()));
        Ok(PrimingStatus::from_parts(still_priming, finish_time))
    }

    async fn pair_and_prime(&self) -> Result<Instant, PodError> {
        let finish_unix = self.proxy.pair_and_prime().await.map_err(map_error)?;
        Ok(instant_from_unix(finish_unix, SystemTime::now(), Instant::now()))
    }

    async fn pod_identity_present(&self) -> bool {
        match self.proxy.pod_identity_present().await {
            Ok(present) => present,
            Err(e) => {
                // Unknown means the user must confirm before anything is shut down.
                tracing::warn!("Pod identity query failed, assuming a pod exists: {e}");
                true
            }
        }
    }
}

/// Map a unix time onto the monotonic clock. Times already in the past
/// collapse to `now`.
fn instant_from_unix(unix_secs: u64, now_wall: SystemTime, now: Instant) -> Instant {
    let target = UNIX_EPOCH + Duration::from_secs(unix_secs);
    match target.duration_since(now_wall) {
        Ok(ahead) => now + ahead,
        Err(_) => now,
    }
}

/// Unix seconds for a monotonic instant, for clients that only see wall time.
pub fn unix_from_instant(at: Instant, now_wall: SystemTime, now: Instant) -> u64 {
    let wall = if at >= now {
        now_wall + (at - now)
    } else {
        now_wall - (now - at)
    };
    wall.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn map_error(error: zbus::Error) -> PodError {
    match error {
        zbus::Error::MethodError(name, detail, _) => error_from_name(name.as_str(), detail),
        zbus::Error::InputOutput(e) => PodError::CommunicationFailure(e.to_string()),
        other => PodError::Unknown(other.to_string()),
    }
}

fn error_from_name(name: &str, detail: Option<String>) -> PodError {
    let detail = detail.unwrap_or_default();
    match name {
        pod_comms_errors::POD_FAULT => PodError::DeviceFault(detail),
        pod_comms_errors::TIMEOUT | "org.freedesktop.DBus.Error.NoReply" => PodError::Timeout,
        pod_comms_errors::CANCELLED => PodError::Cancelled,
        pod_comms_errors::COMMUNICATION | "org.freedesktop.DBus.Error.ServiceUnknown" => {
            PodError::CommunicationFailure(detail)
        }
        other if detail.is_empty() => PodError::Unknown(other.to_string()),
        other => PodError::Unknown(format!("{other}: {detail}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_fault_name_maps_to_device_fault() {
        assert_eq!(
            error_from_name(pod_comms_errors::POD_FAULT, Some("occlusion".into())),
            PodError::DeviceFault("occlusion".into())
        );
    }

    #[test]
    fn transport_names_map_to_recoverable_kinds() {
        assert_eq!(error_from_name("org.freedesktop.DBus.Error.NoReply", None), PodError::Timeout);
        assert_eq!(
            error_from_name("org.freedesktop.DBus.Error.ServiceUnknown", Some("gone".into())),
            PodError::CommunicationFailure("gone".into())
        );
        assert_eq!(error_from_name(pod_comms_errors::CANCELLED, None), PodError::Cancelled);
    }

    #[test]
    fn unrecognised_name_is_unknown_with_detail() {
        assert_eq!(
            error_from_name("org.example.Error.Odd", Some("bad frame".into())),
            PodError::Unknown("org.example.Error.Odd: bad frame".into())
        );
    }

    #[test]
    fn future_unix_time_maps_ahead_of_now() {
        let now_wall = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let now = Instant::now();
        let at = instant_from_unix(1_700_000_055, now_wall, now);
        assert_eq!(at, now + Duration::from_secs(55));
        assert_eq!(unix_from_instant(at, now_wall, now), 1_700_000_055);
    }

    #[test]
    fn past_unix_time_collapses_to_now() {
        let now_wall = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let now = Instant::now();
        assert_eq!(instant_from_unix(1_699_999_995, now_wall, now), now);
    }
}
