//! Request time budget

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ApiError, ApiResult};

/// Elapsed-time budget checked before each blocking step
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    /// Fail with `Timeout` if the budget is spent before `step` begins
    pub fn check(&self, step: &str) -> ApiResult<()> {
        if self.is_expired() {
            tracing::warn!(
                step,
                budget_ms = %self.budget.as_millis(),
                "Request budget exhausted"
            );
            return Err(ApiError::Timeout(format!(
                "processing exceeded {:?} before {}",
                self.budget,
                step
            )));
        }
        Ok(())
    }

    /// Run `fut` bounded by the remaining budget
    pub async fn run<T, F>(&self, step: &str, fut: F) -> ApiResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        self.check(step)?;
        match tokio::time::timeout(self.remaining(), fut).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(format!(
                "processing exceeded {:?} during {}",
                self.budget,
                step
            ))),
        }
    }
}
