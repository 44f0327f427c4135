//! Windowed and lifetime attempt counters

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};
use crate::store::{KeyValueStore, StoreError};

/// SHA-256 of a salted identity, hex encoded.
///
/// Raw identity numbers are never used as store keys or logged.
pub fn hash_identity(raw: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(raw.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Fixed-window limiter: at most `limit` admissions per key per `window`
#[derive(Clone)]
pub struct WindowLimiter {
    store: Arc<dyn KeyValueStore>,
    namespace: &'static str,
    limit: u64,
    window: Duration,
}

impl WindowLimiter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        namespace: &'static str,
        limit: u64,
        window: Duration,
    ) -> Self {
        Self {
            store,
            namespace,
            limit,
            window,
        }
    }

    /// Count this request and report whether it is within the limit.
    ///
    /// The increment and comparison happen on one atomic counter, so
    /// concurrent callers for the same key see distinct counts.
    pub async fn admit(&self, key: &str) -> Result<Admission, StoreError> {
        let window = self
            .store
            .incr_window(&format!("rl:{}:{}", self.namespace, key), self.window)
            .await?;
        if window.count <= self.limit {
            Ok(Admission::Admitted)
        } else {
            Ok(Admission::Refused {
                retry_after: window.resets_in,
            })
        }
    }

    /// [`admit`](Self::admit) mapped to `RateLimited`
    pub async fn check(&self, key: &str) -> ApiResult<()> {
        match self.admit(key).await? {
            Admission::Admitted => Ok(()),
            Admission::Refused { retry_after } => {
                tracing::warn!(namespace = self.namespace, "Rate limit exceeded");
                Err(self.refusal(retry_after))
            }
        }
    }

    pub fn refusal(&self, retry_after: Duration) -> ApiError {
        ApiError::RateLimited {
            message: format!(
                "at most {} {} requests per {}s",
                self.limit,
                self.namespace,
                self.window.as_secs()
            ),
            retry_after,
        }
    }
}

/// Outcome of one windowed admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Refused { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Lifetime cap with no reset
#[derive(Clone)]
pub struct AttemptCounter {
    store: Arc<dyn KeyValueStore>,
    namespace: &'static str,
    cap: u64,
}

impl AttemptCounter {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &'static str, cap: u64) -> Self {
        Self {
            store,
            namespace,
            cap,
        }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Record one attempt; `false` once the cap has been used up
    pub async fn record_attempt(&self, key: &str) -> Result<bool, StoreError> {
        let count = self
            .store
            .incr(&format!("attempts:{}:{}", self.namespace, key))
            .await?;
        Ok(count <= self.cap)
    }
}
