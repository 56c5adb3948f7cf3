// ABOUTME: One-shot timer capability injected into the pairing session.
// ABOUTME: The tokio implementation sleeps on the runtime clock, so paused-time tests stay deterministic.

use tokio::time::Instant;

pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs a callback once at (or after) a given instant.
pub trait Scheduler: Send + Sync {
    fn schedule_at(&self, at: Instant, callback: Callback);
}

/// Schedules on the current tokio runtime.
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_at(&self, at: Instant, callback: Callback) {
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            callback();
        });
    }
}
