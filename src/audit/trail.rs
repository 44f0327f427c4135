//! Append-only per-loan audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

use crate::store::{KeyValueStore, StoreError};

/// Entries kept per loan; the oldest are evicted first
pub const MAX_AUDIT_ENTRIES: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub loan_id: String,
    pub action: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEntry {
    pub fn new(
        loan_id: impl Into<String>,
        action: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            loan_id: loan_id.into(),
            action: action.into(),
            status: status.into(),
            actor_ip: None,
            reason: None,
        }
    }

    pub fn with_actor(mut self, actor_ip: Option<String>) -> Self {
        self.actor_ip = actor_ip;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Copy suitable for callers outside the service: the actor address
    /// keeps only its network part.
    pub fn redacted(mut self) -> Self {
        self.actor_ip = self.actor_ip.as_deref().and_then(mask_ip);
        self
    }
}

/// `a.b.c.x` for IPv4, the first three hextets for IPv6, `None` otherwise
fn mask_ip(raw: &str) -> Option<String> {
    match raw.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            Some(format!("{}.{}.{}.x", a, b, c))
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            Some(format!("{:x}:{:x}:{:x}::/48", s[0], s[1], s[2]))
        }
    }
}

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn KeyValueStore>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(loan_id: &str) -> String {
        format!("audit:{}", loan_id)
    }

    pub async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entry)
            .map_err(|e| StoreError::Backend(format!("audit entry encoding: {}", e)))?;
        self.store
            .push_capped(&Self::key(&entry.loan_id), &raw, MAX_AUDIT_ENTRIES)
            .await
    }

    /// Best-effort append: failures are logged and never surface
    pub async fn record(&self, entry: AuditEntry) {
        match self.append(&entry).await {
            Ok(()) => tracing::info!(
                loan_id = %entry.loan_id,
                action = %entry.action,
                status = %entry.status,
                "Audit entry recorded"
            ),
            Err(e) => tracing::error!(
                loan_id = %entry.loan_id,
                action = %entry.action,
                error = %e,
                "Failed to record audit entry"
            ),
        }
    }

    /// Oldest first
    pub async fn entries(&self, loan_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        let raw = self.store.list(&Self::key(loan_id)).await?;
        Ok(raw
            .iter()
            .filter_map(|line| match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(loan_id, error = %e, "Skipping undecodable audit entry");
                    None
                }
            })
            .collect())
    }
}
