//! Dashboard record types managed through optimistic stores.

mod gem;
mod subscriber;

pub use gem::{gem_store, Gem, GemPatch};
pub use subscriber::{
    subscriber_store, CreditTransaction, Subscriber, SubscriberPatch, SubscriberStatus,
};
