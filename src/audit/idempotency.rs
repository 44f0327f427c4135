//! Cached decisions keyed by (loan id, target)

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::store::{KeyValueStore, StoreError};

const LOCK_STRIPES: usize = 64;

/// Stores serialized response bodies so replays are byte-identical
#[derive(Clone)]
pub struct IdempotencyCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    locks: Arc<Vec<Arc<Mutex<()>>>>,
}

impl IdempotencyCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        let locks = (0..LOCK_STRIPES).map(|_| Arc::new(Mutex::new(()))).collect();
        Self {
            store,
            ttl,
            locks: Arc::new(locks),
        }
    }

    /// Hold while looking up, deciding and storing a response for one loan.
    ///
    /// A concurrent duplicate waits here and then finds the stored body.
    /// The lock is per process; across instances the loan's compare-and-set
    /// transition still admits a single decision.
    pub async fn lock(&self, loan_id: &str) -> OwnedMutexGuard<()> {
        let mut hasher = DefaultHasher::new();
        loan_id.hash(&mut hasher);
        let stripe = (hasher.finish() % self.locks.len() as u64) as usize;
        self.locks[stripe].clone().lock_owned().await
    }

    fn key(loan_id: &str, target: &str) -> String {
        format!("idem:{}:{}", loan_id, target)
    }

    pub async fn get(&self, loan_id: &str, target: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&Self::key(loan_id, target)).await
    }

    pub async fn put(&self, loan_id: &str, target: &str, body: &str) -> Result<(), StoreError> {
        self.store
            .set(&Self::key(loan_id, target), body, Some(self.ttl))
            .await
    }
}
