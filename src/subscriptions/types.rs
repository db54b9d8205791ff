//! Subscription types for store change notifications.

use crate::types::MutationKind;
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only mutation events touching these keys (None = all keys).
    pub keys: Option<Vec<String>>,

    /// Include base replacement events.
    pub include_base: bool,

    /// Include apply/commit/rollback events.
    pub include_mutations: bool,
}

impl SubscriptionFilter {
    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            keys: None,
            include_base: true,
            include_mutations: true,
        }
    }

    /// Subscribe to base replacements only.
    pub fn base() -> Self {
        Self {
            include_base: true,
            ..Default::default()
        }
    }

    /// Subscribe to mutations of specific keys.
    pub fn keys(keys: Vec<String>) -> Self {
        Self {
            keys: Some(keys),
            include_mutations: true,
            ..Default::default()
        }
    }
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// The confirmed collection was replaced.
    BaseReplaced {
        /// Length of the merged view afterwards.
        len: usize,
        /// Number of pending keys that kept their optimistic value.
        shielded: usize,
    },

    /// An optimistic mutation was applied to the view.
    Applied { key: String, kind: MutationKind },

    /// A remote operation succeeded and its result replaced the overlay.
    Committed {
        key: String,
        /// Key of the authoritative record (differs from `key` for adds).
        confirmed_key: Option<String>,
        kind: MutationKind,
    },

    /// A remote operation failed or was abandoned; the overlay was undone.
    RolledBack {
        key: String,
        kind: MutationKind,
        reason: RollbackReason,
    },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

impl StoreEvent {
    /// Key a mutation event refers to.
    pub fn key(&self) -> Option<&str> {
        match self {
            StoreEvent::Applied { key, .. }
            | StoreEvent::Committed { key, .. }
            | StoreEvent::RolledBack { key, .. } => Some(key),
            StoreEvent::BaseReplaced { .. } | StoreEvent::Dropped { .. } => None,
        }
    }
}

/// Why an optimistic mutation was rolled back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackReason {
    /// The remote operation failed.
    Rejected { message: String },
    /// The mutation future was dropped before the remote operation settled.
    Abandoned,
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<StoreEvent> {
        self.receiver.try_iter().collect()
    }
}
