// ABOUTME: Pairing state machine with explicit states, intents, and the effects each transition requests.
// ABOUTME: Pure logic: callers supply the current instant and carry out the returned effects.

use std::fmt;

use podpair_ipc::PairingPhase;
use tokio::time::Instant;

use crate::error::{Disposition, PodError, classify};
use crate::pod::PrimingStatus;

/// The pod's pairing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Initial,
    Pairing,
    Priming { finish_time: Instant },
    Fault,
    Ready,
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.phase())
    }
}

impl PairingState {
    pub fn phase(self) -> PairingPhase {
        match self {
            PairingState::Initial => PairingPhase::Initial,
            PairingState::Pairing => PairingPhase::Pairing,
            PairingState::Priming { .. } => PairingPhase::Priming,
            PairingState::Fault => PairingPhase::Fault,
            PairingState::Ready => PairingPhase::Ready,
        }
    }

    /// Row/list selection is suppressed while the pod is busy.
    pub fn interactions_disabled(self) -> bool {
        matches!(self, PairingState::Pairing | PairingState::Priming { .. })
    }
}

/// Intents delivered by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Continue,
    Cancel,
    ConfirmDeactivation,
    DismissDeactivation,
}

/// Work the owner of the machine must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Invoke the hardware pair-and-prime operation.
    StartPairing,
    /// Deliver a prime timer event at the given instant.
    ScheduleReady(Instant),
    /// Ask whether a pod identity exists before cancelling.
    QueryPodIdentity,
    /// Priming done; the owning workflow proceeds.
    HandOff,
    /// Hand over to the deactivate/replace workflow.
    ReplacePod,
    /// Default cancel; no pod identity to protect.
    Cancel,
}

/// Observable view of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: PairingState,
    pub last_error: Option<String>,
    pub awaiting_confirmation: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: PairingState::Initial,
            last_error: None,
            awaiting_confirmation: false,
        }
    }
}

pub struct PairingMachine {
    state: PairingState,
    last_error: Option<String>,
    awaiting_confirmation: bool,
    reconciliation_started: bool,
}

impl Default for PairingMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingMachine {
    pub fn new() -> Self {
        Self {
            state: PairingState::Initial,
            last_error: None,
            awaiting_confirmation: false,
            reconciliation_started: false,
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            last_error: self.last_error.clone(),
            awaiting_confirmation: self.awaiting_confirmation,
        }
    }

    /// Returns true the first time only; reconciliation runs once per attachment.
    pub fn begin_reconciliation(&mut self) -> bool {
        !std::mem::replace(&mut self.reconciliation_started, true)
    }

    /// Apply the startup priming query. Only meaningful while still `Initial`.
    pub fn on_priming_status(&mut self, status: PrimingStatus, now: Instant) -> Option<Effect> {
        if self.state != PairingState::Initial {
            tracing::debug!("Ignoring priming status in state {}", self.state);
            return None;
        }
        match status {
            PrimingStatus::NotPriming => None,
            PrimingStatus::Priming { finish_time } => self.enter_priming(finish_time, now),
        }
    }

    pub fn on_intent(&mut self, intent: Intent) -> Option<Effect> {
        match (self.state, intent) {
            // The deactivation prompt is modal until confirmed or dismissed.
            (_, Intent::Continue | Intent::Cancel) if self.awaiting_confirmation => {
                tracing::debug!("Ignoring {intent:?} while deactivation prompt is pending");
                None
            }

            (PairingState::Initial, Intent::Continue) => self.pair(),
            (PairingState::Ready, Intent::Continue) => Some(Effect::HandOff),
            (PairingState::Fault, Intent::Continue) => Some(Effect::ReplacePod),
            (PairingState::Pairing | PairingState::Priming { .. }, Intent::Continue) => {
                tracing::debug!("Ignoring Continue in state {}", self.state);
                None
            }

            (_, Intent::Cancel) => Some(Effect::QueryPodIdentity),

            (_, Intent::ConfirmDeactivation) if self.awaiting_confirmation => {
                self.awaiting_confirmation = false;
                Some(Effect::ReplacePod)
            }
            (_, Intent::ConfirmDeactivation) => {
                tracing::debug!("Ignoring deactivation confirmation with no prompt pending");
                None
            }

            (_, Intent::DismissDeactivation) => {
                self.awaiting_confirmation = false;
                None
            }
        }
    }

    /// Start a pairing attempt. Only acts from `Initial`; `Pairing` gates
    /// any second attempt and `Fault` never retries.
    pub fn pair(&mut self) -> Option<Effect> {
        if self.state != PairingState::Initial {
            tracing::debug!("Ignoring pair request in state {}", self.state);
            return None;
        }
        self.set_state(PairingState::Pairing);
        Some(Effect::StartPairing)
    }

    pub fn on_pair_result(
        &mut self,
        result: Result<Instant, PodError>,
        now: Instant,
    ) -> Option<Effect> {
        if self.state != PairingState::Pairing {
            tracing::debug!("Ignoring pairing result in state {}", self.state);
            return None;
        }
        match result {
            Ok(finish_time) => self.enter_priming(finish_time, now),
            Err(error) => {
                self.last_error = Some(error.display_message());
                match classify(&error) {
                    Disposition::UnrecoverableFault => {
                        tracing::error!("Pod faulted during pairing: {error}");
                        self.set_state(PairingState::Fault);
                    }
                    Disposition::Recoverable => {
                        tracing::warn!("Pairing failed, retry possible: {error}");
                        self.set_state(PairingState::Initial);
                    }
                }
                None
            }
        }
    }

    /// A prime timer fired. Stale timers are ignored; a timer delivered
    /// before the finish time is re-armed.
    pub fn on_prime_timer(&mut self, now: Instant) -> Option<Effect> {
        match self.state {
            PairingState::Priming { finish_time } if now >= finish_time => {
                self.set_state(PairingState::Ready);
                None
            }
            PairingState::Priming { finish_time } => {
                tracing::debug!("Prime timer fired early, re-arming");
                Some(Effect::ScheduleReady(finish_time))
            }
            _ => {
                tracing::debug!("Ignoring stale prime timer in state {}", self.state);
                None
            }
        }
    }

    /// Result of the pod identity query issued for a cancel intent.
    pub fn on_pod_identity(&mut self, present: bool) -> Option<Effect> {
        if present {
            self.awaiting_confirmation = true;
            None
        } else {
            Some(Effect::Cancel)
        }
    }

    fn enter_priming(&mut self, finish_time: Instant, now: Instant) -> Option<Effect> {
        if finish_time > now {
            self.set_state(PairingState::Priming { finish_time });
            Some(Effect::ScheduleReady(finish_time))
        } else {
            self.set_state(PairingState::Ready);
            None
        }
    }

    fn set_state(&mut self, next: PairingState) {
        if matches!(
            next,
            PairingState::Pairing | PairingState::Priming { .. } | PairingState::Ready
        ) {
            self.last_error = None;
        }
        if self.state != next {
            tracing::info!("Pairing state: {} -> {}", self.state, next);
        }
        self.state = next;
    }
}
