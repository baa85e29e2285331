//! Background reconciliation decoupled from the mutating ledger call.
//!
//! Callers hand a [`ReconcileRequest`] to a bounded [`ReconcileQueue`] right
//! after the ledger accepted their write. The [`ReconcileWorker`] drains the
//! queue and runs [`ActivityCacheSync::reconcile`], retrying retryable
//! failures with jittered exponential backoff. Reconciliation is idempotent,
//! so a retry after a partial run is safe.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{ActivityCacheSync, Error, ReconcileOutcome, ReconcileRequest};

mod runtime;

pub use runtime::{AttemptJitter, ReconcileWorkerRuntime, TokioSleeper};

/// Queue bound and retry policy for the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileWorkerConfig {
    /// Requests held before `enqueue` starts refusing.
    pub queue_capacity: usize,
    /// Reconcile attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any retry delay before jitter.
    pub max_backoff: Duration,
}

impl Default for ReconcileWorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Async sleeping abstraction for retries.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Retry backoff jitter abstraction.
pub trait BackoffJitter: Send + Sync {
    /// Return a jittered delay from the exponential base delay.
    ///
    /// ```rust
    /// use fitledger::domain::BackoffJitter;
    /// use chrono::{TimeZone, Utc};
    /// use std::time::Duration;
    /// struct DeterministicJitter;
    /// impl BackoffJitter for DeterministicJitter {
    ///     fn jittered_delay(&self, base: Duration, attempt: u32, _now: chrono::DateTime<chrono::Utc>) -> Duration {
    ///         base + Duration::from_millis(u64::from(attempt) * 5)
    ///     }
    /// }
    /// let now = Utc.with_ymd_and_hms(2026, 2, 26, 12, 0, 0).single().expect("valid time");
    /// let delay = DeterministicJitter.jittered_delay(Duration::from_millis(100), 2, now);
    /// assert_eq!(delay, Duration::from_millis(110));
    /// ```
    fn jittered_delay(&self, base: Duration, attempt: u32, now: DateTime<Utc>) -> Duration;
}

/// Producer side of the reconcile queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ReconcileQueue {
    sender: mpsc::Sender<ReconcileRequest>,
}

impl ReconcileQueue {
    /// Queue a request without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`crate::domain::ErrorCode::ServiceUnavailable`] when the queue
    /// is full or the worker has stopped. The ledger write stays valid; the
    /// caller may reconcile inline or retry later.
    pub fn enqueue(&self, request: ReconcileRequest) -> Result<(), Error> {
        self.sender.try_send(request).map_err(|error| match error {
            mpsc::error::TrySendError::Full(request) => {
                warn!(user_id = %request.user_id, receipt = %request.receipt, "reconcile queue full");
                Error::service_unavailable("reconcile queue is full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::service_unavailable("reconcile worker has stopped")
            }
        })
    }
}

/// Consumer side: runs reconciliations with retry.
pub struct ReconcileWorker {
    sync: Arc<ActivityCacheSync>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn RetrySleeper>,
    jitter: Arc<dyn BackoffJitter>,
    config: ReconcileWorkerConfig,
    receiver: mpsc::Receiver<ReconcileRequest>,
}

impl ReconcileWorker {
    /// Build a queue and its worker with Tokio sleeping and attempt jitter.
    pub fn new(
        sync: Arc<ActivityCacheSync>,
        clock: Arc<dyn Clock>,
        config: ReconcileWorkerConfig,
    ) -> (ReconcileQueue, Self) {
        Self::with_runtime(sync, clock, ReconcileWorkerRuntime::default(), config)
    }

    /// Build a queue and its worker with injected runtime abstractions.
    pub fn with_runtime(
        sync: Arc<ActivityCacheSync>,
        clock: Arc<dyn Clock>,
        runtime: ReconcileWorkerRuntime,
        config: ReconcileWorkerConfig,
    ) -> (ReconcileQueue, Self) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let worker = Self {
            sync,
            clock,
            sleeper: runtime.sleeper,
            jitter: runtime.jitter,
            config,
            receiver,
        };
        (ReconcileQueue { sender }, worker)
    }

    /// Drain the queue until every [`ReconcileQueue`] handle is dropped.
    pub async fn run(mut self) {
        while let Some(request) = self.receiver.recv().await {
            match self.process(&request).await {
                Ok(outcome) => info!(
                    user_id = %request.user_id,
                    receipt = %request.receipt,
                    newly_completed = outcome.newly_completed.len(),
                    "queued reconciliation applied"
                ),
                Err(error) => error!(
                    user_id = %request.user_id,
                    receipt = %request.receipt,
                    code = ?error.code(),
                    %error,
                    "ledger write succeeded, cache pending"
                ),
            }
        }
        info!("reconcile queue closed; worker stopping");
    }

    /// Reconcile one request, retrying retryable failures.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once
    /// `max_attempts` is exhausted.
    pub async fn process(&self, request: &ReconcileRequest) -> Result<ReconcileOutcome, Error> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.sync.reconcile(request).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.jitter.jittered_delay(
                        self.retry_base_delay(attempt),
                        attempt,
                        self.clock.utc(),
                    );
                    warn!(
                        user_id = %request.user_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "reconciliation failed; retrying"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn retry_base_delay(&self, attempt: u32) -> Duration {
        let exponent = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base_ms = u64::try_from(self.config.initial_backoff.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.config.max_backoff.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(u64::from(exponent)).min(max_ms))
    }
}

#[cfg(test)]
mod tests;
