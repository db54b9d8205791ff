//! Subscriber records and their credit ledger.

use crate::store::{OptimisticStore, StoreConfig};
use crate::types::{ById, Identified, Patch};
use serde::{Deserialize, Serialize};

/// Membership status of a subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriberStatus {
    Active,
    Pending,
    Banned,
}

/// One entry in a subscriber's credit ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// ISO date (`YYYY-MM-DD`).
    pub date: String,
    pub description: String,
    /// Signed credit delta.
    pub amount: i64,
}

/// A community member.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(rename = "user_id")]
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub status: SubscriberStatus,
    pub credits: i64,
    #[serde(default)]
    pub credit_history: Vec<CreditTransaction>,
    #[serde(default)]
    pub telegram_id: Option<String>,
}

impl Identified for Subscriber {
    fn id(&self) -> &str {
        &self.user_id
    }
}

impl Subscriber {
    /// Case-insensitive substring match on name or email.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query) || self.email.to_lowercase().contains(&query)
    }

    /// Sum of the credit ledger.
    pub fn ledger_balance(&self) -> i64 {
        self.credit_history.iter().map(|tx| tx.amount).sum()
    }
}

/// Field overrides for a subscriber. Unset fields are left alone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubscriberPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub status: Option<SubscriberStatus>,
    pub credits: Option<i64>,
    /// `Some(None)` clears the Telegram ID.
    pub telegram_id: Option<Option<String>>,
}

impl SubscriberPatch {
    pub fn credits(credits: i64) -> Self {
        Self {
            credits: Some(credits),
            ..Default::default()
        }
    }

    pub fn status(status: SubscriberStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn telegram_id(telegram_id: Option<String>) -> Self {
        Self {
            telegram_id: Some(telegram_id),
            ..Default::default()
        }
    }
}

impl Patch<Subscriber> for SubscriberPatch {
    fn apply_to(&self, record: &mut Subscriber) {
        if let Some(name) = &self.name {
            record.name = name.clone();
        }
        if let Some(email) = &self.email {
            record.email = email.clone();
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(credits) = self.credits {
            record.credits = credits;
        }
        if let Some(telegram_id) = &self.telegram_id {
            record.telegram_id = telegram_id.clone();
        }
    }
}

/// A store of subscribers keyed by `user_id`.
pub fn subscriber_store() -> OptimisticStore<Subscriber> {
    OptimisticStore::with_config(ById, StoreConfig::named("subscribers"))
}
