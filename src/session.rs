// ABOUTME: Drives one pod attachment: owns the pairing machine and runs its effects on a single task.
// ABOUTME: Hardware calls, identity queries, and prime timers report back as events on the session channel.

use std::sync::Arc;

use podpair_ipc::SetupOutcome;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::error::PodError;
use crate::pod::{PodLink, PrimingStatus};
use crate::scheduler::Scheduler;
use crate::state::{Effect, Intent, PairingMachine, Snapshot};

/// Everything that can resume the session.
#[derive(Debug)]
enum SessionEvent {
    Intent(Intent),
    PrimingStatus(Result<PrimingStatus, PodError>),
    PairFinished(Result<Instant, PodError>),
    PrimeTimerFired,
    PodIdentity(bool),
}

/// Cloneable entry point for presentation intents.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Deliver an intent. Returns false once the session has ended.
    pub fn send(&self, intent: Intent) -> bool {
        self.tx.send(SessionEvent::Intent(intent)).is_ok()
    }
}

pub struct Session {
    machine: PairingMachine,
    pod: Arc<dyn PodLink>,
    scheduler: Arc<dyn Scheduler>,
    tx: mpsc::UnboundedSender<SessionEvent>,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Session {
    /// Attach to a pod. Returns the session, a handle for intents, and a
    /// receiver that observes every state change.
    pub fn new(
        pod: Arc<dyn PodLink>,
        scheduler: Arc<dyn Scheduler>,
    ) -> (Self, SessionHandle, watch::Receiver<Snapshot>) {
        let machine = PairingMachine::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle { tx: tx.clone() };

        let session = Self {
            machine,
            pod,
            scheduler,
            tx,
            rx,
            snapshot_tx,
        };
        (session, handle, snapshot_rx)
    }

    /// Run until the session reaches an outcome.
    pub async fn run(mut self) -> SetupOutcome {
        if self.machine.begin_reconciliation() {
            self.spawn_reconciliation();
        }

        loop {
            // The session keeps its own sender, so the channel never closes here.
            let Some(event) = self.rx.recv().await else {
                return SetupOutcome::Cancelled;
            };

            let now = Instant::now();
            let effect = match event {
                SessionEvent::Intent(intent) => {
                    tracing::debug!("Intent {intent:?} in state {}", self.machine.state());
                    self.machine.on_intent(intent)
                }
                SessionEvent::PrimingStatus(Ok(status)) => {
                    tracing::info!("Priming status at attach: {status:?}");
                    self.machine.on_priming_status(status, now)
                }
                SessionEvent::PrimingStatus(Err(e)) => {
                    tracing::warn!("Priming status query failed, staying in current state: {e}");
                    None
                }
                SessionEvent::PairFinished(result) => self.machine.on_pair_result(result, now),
                SessionEvent::PrimeTimerFired => self.machine.on_prime_timer(now),
                SessionEvent::PodIdentity(present) => self.machine.on_pod_identity(present),
            };

            self.publish();

            if let Some(effect) = effect {
                if let Some(outcome) = self.apply(effect) {
                    tracing::info!("Pairing session finished: {outcome}");
                    return outcome;
                }
            }
        }
    }

    fn apply(&self, effect: Effect) -> Option<SetupOutcome> {
        match effect {
            Effect::StartPairing => {
                let pod = self.pod.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = pod.pair_and_prime().await;
                    let _ = tx.send(SessionEvent::PairFinished(result));
                });
                None
            }
            Effect::ScheduleReady(at) => {
                let tx = self.tx.clone();
                self.scheduler.schedule_at(
                    at,
                    Box::new(move || {
                        let _ = tx.send(SessionEvent::PrimeTimerFired);
                    }),
                );
                None
            }
            Effect::QueryPodIdentity => {
                let pod = self.pod.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let present = pod.pod_identity_present().await;
                    let _ = tx.send(SessionEvent::PodIdentity(present));
                });
                None
            }
            Effect::HandOff => Some(SetupOutcome::HandedOff),
            Effect::ReplacePod => Some(SetupOutcome::ReplacePod),
            Effect::Cancel => Some(SetupOutcome::Cancelled),
        }
    }

    fn spawn_reconciliation(&self) {
        let pod = self.pod.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let status = pod.priming_status().await;
            let _ = tx.send(SessionEvent::PrimingStatus(status));
        });
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::scheduler::{Callback, TokioScheduler};
    use crate::state::PairingState;

    const PAIR_LATENCY: Duration = Duration::from_secs(1);

    enum StatusPlan {
        NotPriming,
        FinishesIn(Duration),
        FinishedAgo(Duration),
    }

    struct FakePod {
        status: StatusPlan,
        pair_results: Mutex<VecDeque<Result<Duration, PodError>>>,
        pair_calls: AtomicUsize,
        identity_present: bool,
    }

    impl FakePod {
        fn new(status: StatusPlan) -> Self {
            Self {
                status,
                pair_results: Mutex::new(VecDeque::new()),
                pair_calls: AtomicUsize::new(0),
                identity_present: false,
            }
        }

        fn with_pair_result(self, result: Result<Duration, PodError>) -> Self {
            self.pair_results.lock().unwrap().push_back(result);
            self
        }

        fn with_identity(mut self) -> Self {
            self.identity_present = true;
            self
        }

        fn pair_calls(&self) -> usize {
            self.pair_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PodLink for FakePod {
        async fn priming_status(&self) -> Result<PrimingStatus, PodError> {
            let now = Instant::now();
            Ok(match self.status {
                StatusPlan::NotPriming => PrimingStatus::NotPriming,
                StatusPlan::FinishesIn(d) => PrimingStatus::Priming { finish_time: now + d },
                StatusPlan::FinishedAgo(d) => PrimingStatus::Priming {
                    finish_time: now.checked_sub(d).unwrap_or(now),
                },
            })
        }

        async fn pair_and_prime(&self) -> Result<Instant, PodError> {
            self.pair_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(PAIR_LATENCY).await;
            let result = self
                .pair_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(PodError::Unknown("no scripted result".into())));
            result.map(|d| Instant::now() + d)
        }

        async fn pod_identity_present(&self) -> bool {
            self.identity_present
        }
    }

    /// Records deadlines and only fires when the test says so.
    #[derive(Default)]
    struct ManualScheduler {
        deadlines: Mutex<Vec<Instant>>,
        pending: Mutex<VecDeque<Callback>>,
    }

    impl ManualScheduler {
        fn deadlines(&self) -> Vec<Instant> {
            self.deadlines.lock().unwrap().clone()
        }

        fn fire_next(&self) {
            let callback = self.pending.lock().unwrap().pop_front();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn schedule_at(&self, at: Instant, callback: Callback) {
            self.deadlines.lock().unwrap().push(at);
            self.pending.lock().unwrap().push_back(callback);
        }
    }

    async fn wait_until(
        rx: &mut watch::Receiver<Snapshot>,
        pred: impl FnMut(&Snapshot) -> bool,
    ) -> Snapshot {
        rx.wait_for(pred).await.expect("session ended").clone()
    }

    fn priming_finish(snapshot: &Snapshot) -> Instant {
        match snapshot.state {
            PairingState::Priming { finish_time } => finish_time,
            other => panic!("expected Priming, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_pod_pairs_primes_and_hands_off() {
        let pod = Arc::new(
            FakePod::new(StatusPlan::NotPriming).with_pair_result(Ok(Duration::from_secs(3600))),
        );
        let (session, handle, mut rx) = Session::new(pod.clone(), Arc::new(TokioScheduler));
        let task = tokio::spawn(session.run());

        assert_eq!(rx.borrow().state, PairingState::Initial);
        assert!(handle.send(Intent::Continue));
        wait_until(&mut rx, |s| s.state == PairingState::Pairing).await;

        let priming = wait_until(&mut rx, |s| matches!(s.state, PairingState::Priming { .. })).await;
        let finish = priming_finish(&priming);

        wait_until(&mut rx, |s| s.state == PairingState::Ready).await;
        assert!(Instant::now() >= finish);

        handle.send(Intent::Continue);
        assert_eq!(task.await.unwrap(), SetupOutcome::HandedOff);
        assert_eq!(pod.pair_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_while_priming_resumes_without_pairing() {
        let pod = Arc::new(FakePod::new(StatusPlan::FinishesIn(Duration::from_secs(10))));
        let (session, _handle, mut rx) = Session::new(pod.clone(), Arc::new(TokioScheduler));
        let attached_at = Instant::now();
        tokio::spawn(session.run());

        let priming = wait_until(&mut rx, |s| matches!(s.state, PairingState::Priming { .. })).await;
        let finish = priming_finish(&priming);
        assert_eq!(finish, attached_at + Duration::from_secs(10));

        wait_until(&mut rx, |s| s.state == PairingState::Ready).await;
        assert!(Instant::now() >= finish);
        assert_eq!(pod.pair_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_after_priming_elapsed_is_ready_without_timer() {
        let pod = Arc::new(FakePod::new(StatusPlan::FinishedAgo(Duration::from_secs(5))));
        let scheduler = Arc::new(ManualScheduler::default());
        let (session, _handle, mut rx) = Session::new(pod.clone(), scheduler.clone());
        tokio::spawn(session.run());

        wait_until(&mut rx, |s| s.state == PairingState::Ready).await;
        assert!(scheduler.deadlines().is_empty());
        assert_eq!(pod.pair_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn device_fault_routes_continue_to_replacement() {
        let pod = Arc::new(
            FakePod::new(StatusPlan::NotPriming)
                .with_pair_result(Err(PodError::DeviceFault("occlusion".into()))),
        );
        let (session, handle, mut rx) = Session::new(pod.clone(), Arc::new(TokioScheduler));
        let task = tokio::spawn(session.run());

        handle.send(Intent::Continue);
        let fault = wait_until(&mut rx, |s| s.state == PairingState::Fault).await;
        assert!(fault.last_error.is_some());

        handle.send(Intent::Continue);
        assert_eq!(task.await.unwrap(), SetupOutcome::ReplacePod);
        assert_eq!(pod.pair_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_allows_retry_and_success_clears_error() {
        let pod = Arc::new(
            FakePod::new(StatusPlan::NotPriming)
                .with_pair_result(Err(PodError::Timeout))
                .with_pair_result(Ok(Duration::from_secs(60))),
        );
        let (session, handle, mut rx) = Session::new(pod.clone(), Arc::new(TokioScheduler));
        tokio::spawn(session.run());

        handle.send(Intent::Continue);
        let failed = wait_until(&mut rx, |s| {
            s.state == PairingState::Initial && s.last_error.is_some()
        })
        .await;
        assert!(!failed.last_error.unwrap_or_default().is_empty());

        handle.send(Intent::Continue);
        let retrying = wait_until(&mut rx, |s| s.state == PairingState::Pairing).await;
        assert_eq!(retrying.last_error, None);

        let priming = wait_until(&mut rx, |s| matches!(s.state, PairingState::Priming { .. })).await;
        assert_eq!(priming.last_error, None);
        assert_eq!(pod.pair_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_with_pod_identity_waits_for_confirmation() {
        let pod = Arc::new(FakePod::new(StatusPlan::NotPriming).with_identity());
        let (session, handle, mut rx) = Session::new(pod, Arc::new(TokioScheduler));
        let task = tokio::spawn(session.run());

        handle.send(Intent::Cancel);
        wait_until(&mut rx, |s| s.awaiting_confirmation).await;
        assert!(!task.is_finished());

        handle.send(Intent::ConfirmDeactivation);
        assert_eq!(task.await.unwrap(), SetupOutcome::ReplacePod);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_without_pod_identity_cancels_directly() {
        let pod = Arc::new(FakePod::new(StatusPlan::NotPriming));
        let (session, handle, rx) = Session::new(pod, Arc::new(TokioScheduler));
        let task = tokio::spawn(session.run());

        handle.send(Intent::Cancel);
        assert_eq!(task.await.unwrap(), SetupOutcome::Cancelled);
        assert!(!rx.borrow().awaiting_confirmation);
    }

    #[tokio::test(start_paused = true)]
    async fn early_timer_is_rearmed_and_ready_only_at_finish() {
        let pod = Arc::new(FakePod::new(StatusPlan::FinishesIn(Duration::from_secs(10))));
        let scheduler = Arc::new(ManualScheduler::default());
        let (session, _handle, mut rx) = Session::new(pod, scheduler.clone());
        tokio::spawn(session.run());

        let priming = wait_until(&mut rx, |s| matches!(s.state, PairingState::Priming { .. })).await;
        let finish = priming_finish(&priming);
        assert_eq!(scheduler.deadlines(), vec![finish]);

        scheduler.fire_next();
        while scheduler.deadlines().len() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(rx.borrow().state, PairingState::Priming { .. }));
        assert_eq!(scheduler.deadlines(), vec![finish, finish]);

        tokio::time::advance(Duration::from_secs(10)).await;
        scheduler.fire_next();
        wait_until(&mut rx, |s| s.state == PairingState::Ready).await;
    }

    #[tokio::test(start_paused = true)]
    async fn handle_reports_closed_session() {
        let pod = Arc::new(FakePod::new(StatusPlan::NotPriming));
        let (session, handle, _rx) = Session::new(pod, Arc::new(TokioScheduler));
        drop(session);
        assert!(!handle.send(Intent::Continue));
    }
}
