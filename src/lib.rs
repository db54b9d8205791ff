//! # Optimistic Store
//!
//! A record collection that reflects mutations immediately and reconciles
//! them once their remote operation settles.
//!
//! ## Core Concepts
//!
//! - **Base**: the last confirmed collection, replaced wholesale by the feed
//! - **Merged view**: the base with every in-flight mutation overlaid
//! - **Pending keys**: keys whose remote operation hasn't settled yet
//! - **Reconciliation**: commit the authoritative result, or roll back
//!
//! ## Example
//!
//! ```ignore
//! use optimistic_store::{subscriber_store, SubscriberPatch};
//!
//! let store = subscriber_store();
//! store.replace_base(fetch_subscribers().await?);
//!
//! // The view shows 150 credits right away; if the backend call fails the
//! // old balance comes back and the error is returned.
//! let updated = store
//!     .update("usr_1", SubscriberPatch::credits(150), api.set_credits("usr_1", 150))
//!     .await?;
//! ```

pub mod error;
pub mod records;
mod state;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{MutationError, Result, StoreError};
pub use records::{
    gem_store, subscriber_store, CreditTransaction, Gem, GemPatch, Subscriber, SubscriberPatch,
    SubscriberStatus,
};
pub use store::{OptimisticStore, StoreConfig};
pub use subscriptions::{
    DropReason, RollbackReason, StoreEvent, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
pub use types::*;
