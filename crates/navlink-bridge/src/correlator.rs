//! Request/response correlation for one-shot service calls.
//!
//! Pending requests are keyed by their wire id. The gateway's usage contract
//! allows at most one outstanding call per [`ServiceKind`], so beginning a
//! new call removes any older pending entry of the same kind; a late reply
//! to the superseded call then resolves to nothing and is dropped.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use navlink_types::ServiceKind;
use tracing::debug;

/// Pending entries older than this are discarded on the periodic tick.
pub const REQUEST_TIMEOUT_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct Pending {
    kind: ServiceKind,
    created_at: DateTime<Utc>,
}

/// Map of in-flight service calls, keyed by request id.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: HashMap<String, Pending>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new outbound call and return its wire id,
    /// `"<kind label>_<unix millis>"`. Any older pending entry of the same
    /// kind is superseded.
    pub fn begin(&mut self, kind: ServiceKind) -> String {
        let superseded = self.pending.len();
        self.pending.retain(|_, p| p.kind != kind);
        if self.pending.len() < superseded {
            debug!(kind = %kind, "pending request superseded by newer call");
        }

        let now = Utc::now();
        let id = format!("{}_{}", kind.label(), now.timestamp_millis());
        self.pending.insert(id.clone(), Pending { kind, created_at: now });
        id
    }

    /// Consume the pending entry for `id`, if any. `None` means the response
    /// is unmatched (late, superseded, or never ours) and must be dropped.
    pub fn resolve(&mut self, id: &str) -> Option<ServiceKind> {
        self.pending.remove(id).map(|p| p.kind)
    }

    /// Discard entries older than `max_age`. Called from the periodic tick.
    pub fn prune(&mut self, max_age: Duration) {
        self.prune_at(Utc::now(), max_age);
    }

    fn prune_at(&mut self, now: DateTime<Utc>, max_age: Duration) {
        let before = self.pending.len();
        self.pending.retain(|_, p| now - p.created_at <= max_age);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(dropped, "timed-out service calls discarded");
        }
    }

    /// Drop every pending entry. Called on disconnect; abandoned calls never
    /// see a completion.
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!(abandoned = self.pending.len(), "pending service calls cleared");
        }
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
