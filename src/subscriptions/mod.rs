//! Change notifications for store consumers.
//!
//! Every state transition of the store is broadcast after it happens:
//! - Base replacements from the confirmed feed
//! - Optimistic applies
//! - Commits and rollbacks when a remote operation settles
//!
//! Subscriptions support filtering by event class and key, and use bounded
//! buffers that drop slow subscribers.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::keys(vec!["usr_1".to_string()]),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(StoreEvent::RolledBack { key, reason, .. }) => show_error(&key, &reason),
//!         Ok(StoreEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => rerender(store.data()),
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, RollbackReason, StoreEvent, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId,
};
