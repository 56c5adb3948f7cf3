// ABOUTME: In-process simulated pod for development without radio hardware.
// ABOUTME: Pairs after a configurable latency, primes for a configurable duration, and can inject failures.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::{SimulatedFailure, SimulatorConfig};
use crate::error::PodError;
use crate::pod::{PodLink, PrimingStatus};

#[derive(Default)]
struct SimulatedPodState {
    paired: bool,
    prime_finish: Option<Instant>,
}

pub struct SimulatedPod {
    prime_duration: Duration,
    pair_latency: Duration,
    failure: Option<SimulatedFailure>,
    state: Mutex<SimulatedPodState>,
}

impl SimulatedPod {
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            prime_duration: Duration::from_secs(config.prime_duration_secs),
            pair_latency: Duration::from_millis(config.pair_latency_ms),
            failure: config.failure,
            state: Mutex::new(SimulatedPodState::default()),
        }
    }
}

fn failure_error(failure: SimulatedFailure) -> PodError {
    match failure {
        SimulatedFailure::Fault => PodError::DeviceFault("simulated occlusion".to_string()),
        SimulatedFailure::Timeout => PodError::Timeout,
        SimulatedFailure::Communication => {
            PodError::CommunicationFailure("simulated radio loss".to_string())
        }
        SimulatedFailure::Cancelled => PodError::Cancelled,
    }
}

#[async_trait]
impl PodLink for SimulatedPod {
    async fn priming_status(&self) -> Result<PrimingStatus, PodError> {
        let state = self.state.lock().unwrap();
        Ok(PrimingStatus::from_parts(
            state.prime_finish.is_some(),
            state.prime_finish,
        ))
    }

    async fn pair_and_prime(&self) -> Result<Instant, PodError> {
        tokio::time::sleep(self.pair_latency).await;

        let mut state = self.state.lock().unwrap();
        // A fault still leaves an identity behind, like a real pod that paired first.
        state.paired = true;
        if let Some(failure) = self.failure {
            let error = failure_error(failure);
            tracing::info!("Simulated pod failing pairing: {error}");
            return Err(error);
        }

        let finish = Instant::now() + self.prime_duration;
        state.prime_finish = Some(finish);
        tracing::info!("Simulated pod priming for {:?}", self.prime_duration);
        Ok(finish)
    }

    async fn pod_identity_present(&self) -> bool {
        self.state.lock().unwrap().paired
    }
}
