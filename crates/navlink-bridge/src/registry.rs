//! Subscription bookkeeping.
//!
//! The registry tracks, per wire topic, whether a subscription is currently
//! active and which typed decoder its messages should go through. Entries are
//! never physically removed while the process runs; `deactivate` only marks
//! them inactive, so a later reconnect replays exactly the active set.

use std::collections::HashMap;

use navlink_types::TopicKind;
use tracing::debug;

/// One tracked topic subscription, keyed by its wire topic.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub wire_topic: String,
    pub message_type: String,
    pub kind: TopicKind,
    pub active: bool,
}

/// Keyed store of everything the application has ever subscribed to.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: HashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `wire_topic` active. Returns `true` when the topic transitioned
    /// from inactive (or unknown) to active, meaning a `subscribe` frame is
    /// due; an already-active topic is a no-op.
    pub fn activate(&mut self, wire_topic: &str, message_type: &str, kind: TopicKind) -> bool {
        if let Some(entry) = self.entries.get_mut(wire_topic) {
            if entry.active {
                return false;
            }
            entry.active = true;
            entry.message_type = message_type.to_string();
            entry.kind = kind;
            debug!(topic = wire_topic, "subscription reactivated");
            return true;
        }
        self.entries.insert(
            wire_topic.to_string(),
            Subscription {
                wire_topic: wire_topic.to_string(),
                message_type: message_type.to_string(),
                kind,
                active: true,
            },
        );
        debug!(topic = wire_topic, "subscription added");
        true
    }

    /// Mark `wire_topic` inactive. Returns `true` when the topic was active,
    /// meaning an `unsubscribe` frame is due.
    pub fn deactivate(&mut self, wire_topic: &str) -> bool {
        match self.entries.get_mut(wire_topic) {
            Some(entry) if entry.active => {
                entry.active = false;
                debug!(topic = wire_topic, "subscription deactivated");
                true
            }
            _ => false,
        }
    }

    /// Look up a topic, active or not.
    pub fn get(&self, wire_topic: &str) -> Option<&Subscription> {
        self.entries.get(wire_topic)
    }

    /// All currently active subscriptions, in no guaranteed order. Drives
    /// the replay after a reconnect.
    pub fn active(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.values().filter(|s| s.active)
    }

    /// True when at least one subscription is active. Gates the reconnect
    /// timer: with no demand there is nothing to reconnect for.
    pub fn has_active(&self) -> bool {
        self.entries.values().any(|s| s.active)
    }
}
