//! Process-local store backed by hash maps

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{KeyValueStore, StoreError, WindowCount};

#[derive(Debug, Clone)]
struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone)]
struct Counter {
    count: u64,
    reset_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, ValueEntry>,
    counters: HashMap<String, Counter>,
    lists: HashMap<String, VecDeque<String>>,
}

/// In-memory store for tests and single-instance development
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired values and counters whose window has elapsed
    pub async fn cleanup(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner
            .values
            .retain(|_, entry| entry.expires_at.map_or(true, |at| at > now));
        inner
            .counters
            .retain(|_, counter| counter.reset_at.map_or(true, |at| at > now));
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        let now = Instant::now();
        Ok(inner
            .values
            .get(key)
            .filter(|entry| entry.expires_at.map_or(true, |at| at > now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let counter = inner.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            reset_at: Some(now + window),
        });

        if counter.reset_at.map_or(false, |at| at <= now) {
            counter.count = 0;
            counter.reset_at = Some(now + window);
        }

        counter.count += 1;
        Ok(WindowCount {
            count: counter.count,
            resets_in: counter
                .reset_at
                .map_or(window, |at| at.saturating_duration_since(now)),
        })
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let counter = inner.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            reset_at: None,
        });
        counter.count += 1;
        Ok(counter.count)
    }

    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        while list.len() > cap {
            list.pop_front();
        }
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .lists
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
