//! Shared key-value state
//!
//! Rate-limit counters, idempotency entries, geocode cache entries and audit
//! trails all live behind [`KeyValueStore`]. Counter updates are atomic per
//! key, so two concurrent requests can never both slip under a limit.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::error::ApiError;

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Errors raised by a key-value backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("corrupt entry under key {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::DependencyUnavailable(err.to_string())
    }
}

/// Count returned by a windowed increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    /// Time until the current window closes
    pub resets_in: Duration,
}

/// Pluggable key-value backend
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a live (unexpired) value
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically increment a windowed counter and return the new count.
    ///
    /// The window starts at the first increment; once it elapses the next
    /// increment restarts the count at 1.
    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError>;

    /// Atomically increment a counter that never resets
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Append to a list, evicting the oldest entries beyond `cap`
    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<(), StoreError>;

    /// Read a list, oldest first
    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Backend liveness check
    async fn ping(&self) -> Result<(), StoreError>;
}
