//! Time-bounded polling of external call status

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Poll interval for call status
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Hard ceiling on how long a call is monitored
pub const POLL_CEILING: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Failed,
    NoAnswer,
    Busy,
    Canceled,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            CallStatus::Queued | CallStatus::Ringing | CallStatus::InProgress
        )
    }
}

#[derive(Error, Debug)]
pub enum CallSourceError {
    #[error("call status lookup failed: {0}")]
    Lookup(String),
}

/// Telephony provider status lookup
#[async_trait]
pub trait CallStatusSource: Send + Sync {
    async fn status(&self, call_id: &str) -> Result<CallStatus, CallSourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Completed(T),
    TimedOut,
    Cancelled,
}

/// Probe every `interval` until it yields a value, `ceiling` elapses or
/// `cancel` flips to `true`.
///
/// A dropped cancel sender just means nobody can cancel any more.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    ceiling: Duration,
    mut cancel: watch::Receiver<bool>,
    mut poll_once: F,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    if *cancel.borrow() {
        return PollOutcome::Cancelled;
    }

    let started = Instant::now();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cancellable = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = cancel.changed(), if cancellable => {
                match changed {
                    Ok(()) if *cancel.borrow() => return PollOutcome::Cancelled,
                    Ok(()) => {}
                    Err(_) => cancellable = false,
                }
                continue;
            }
        }

        if started.elapsed() >= ceiling {
            return PollOutcome::TimedOut;
        }
        if let Some(value) = poll_once().await {
            return PollOutcome::Completed(value);
        }
    }
}

/// Watches a call until it reaches a terminal status
#[derive(Clone)]
pub struct CallMonitor {
    source: Arc<dyn CallStatusSource>,
    interval: Duration,
    ceiling: Duration,
}

impl CallMonitor {
    pub fn new(source: Arc<dyn CallStatusSource>) -> Self {
        Self {
            source,
            interval: POLL_INTERVAL,
            ceiling: POLL_CEILING,
        }
    }

    pub fn with_timing(mut self, interval: Duration, ceiling: Duration) -> Self {
        self.interval = interval;
        self.ceiling = ceiling;
        self
    }

    /// Lookup errors are logged and polling continues
    pub async fn monitor_call(
        &self,
        call_id: &str,
        cancel: watch::Receiver<bool>,
    ) -> PollOutcome<CallStatus> {
        let source = &self.source;
        let outcome = poll_until(self.interval, self.ceiling, cancel, move || async move {
            match source.status(call_id).await {
                Ok(status) if status.is_terminal() => Some(status),
                Ok(status) => {
                    tracing::debug!(call_id, ?status, "Call still active");
                    None
                }
                Err(e) => {
                    tracing::warn!(call_id, error = %e, "Call status poll failed");
                    None
                }
            }
        })
        .await;

        match &outcome {
            PollOutcome::Completed(status) => {
                tracing::info!(call_id, ?status, "Call reached terminal status")
            }
            PollOutcome::TimedOut => tracing::warn!(call_id, "Call monitoring ceiling reached"),
            PollOutcome::Cancelled => tracing::info!(call_id, "Call monitoring cancelled"),
        }
        outcome
    }
}
