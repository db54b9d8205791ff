//! The optimistic store tying overlay state, identity, and notifications together.

use crate::error::{MutationError, StoreError};
use crate::state::OverlayState;
use crate::subscriptions::{
    RollbackReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
use crate::types::{Field, Identity, MutationKind, Patch, StoreStats};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Name used in log output.
    pub name: String,

    /// Prefix of keys handed out by [`OptimisticStore::temp_key`].
    pub temp_key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            temp_key_prefix: "temp-".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

struct Inner<T> {
    config: StoreConfig,
    identity: Box<dyn Identity<T>>,
    state: RwLock<OverlayState<T>>,
    next_temp: AtomicU64,
    subscriptions: SubscriptionManager,
}

/// A collection that reflects mutations before their remote call returns.
///
/// The store keeps the last confirmed collection (the base) and a merged
/// view with every in-flight mutation overlaid. Consumers render
/// [`data`](Self::data); the confirmed feed calls
/// [`replace_base`](Self::replace_base) whenever it has news.
///
/// `add`, `update` and `delete` apply their overlay immediately when called
/// and return a future that drives the caller's remote operation. When the
/// remote operation succeeds its result replaces the overlay; when it fails
/// the overlay is undone before the error is handed back. Dropping the
/// returned future before the remote operation settles also undoes the
/// overlay.
///
/// The handle is cheap to clone and all clones share state. Each state
/// transition takes the lock once; the lock is never held while a remote
/// operation runs.
pub struct OptimisticStore<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for OptimisticStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for OptimisticStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticStore")
            .field("name", &self.inner.config.name)
            .finish_non_exhaustive()
    }
}

impl OptimisticStore<Value> {
    /// A store of JSON objects keyed by the string field `field`.
    pub fn json(field: impl Into<String>) -> Self {
        Self::new(Field::new(field))
    }
}

impl<T: Clone + 'static> OptimisticStore<T> {
    /// Create an empty store.
    pub fn new(identity: impl Identity<T>) -> Self {
        Self::with_config(identity, StoreConfig::default())
    }

    /// Create an empty store with custom configuration.
    pub fn with_config(identity: impl Identity<T>, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                identity: Box::new(identity),
                state: RwLock::new(OverlayState::new()),
                next_temp: AtomicU64::new(1),
                subscriptions: SubscriptionManager::new(),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    // --- Queries ---

    /// The merged view: confirmed records with pending mutations applied.
    pub fn data(&self) -> Vec<T> {
        self.inner.state.read().merged().to_vec()
    }

    /// The last confirmed collection.
    pub fn base(&self) -> Vec<T> {
        self.inner.state.read().base().to_vec()
    }

    /// Get a record from the merged view.
    pub fn get(&self, key: &str) -> Option<T> {
        self.inner
            .state
            .read()
            .get(self.inner.identity.as_ref(), key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().merged().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` has a mutation whose remote operation hasn't settled.
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.state.read().is_pending(key)
    }

    pub fn has_pending_operations(&self) -> bool {
        self.inner.state.read().pending_len() > 0
    }

    /// Keys with a mutation in flight, sorted.
    pub fn pending_keys(&self) -> Vec<String> {
        self.inner.state.read().pending_keys()
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.state.read().stats()
    }

    // --- Temporary Keys ---

    /// A fresh placeholder key for a record whose real key the backend assigns.
    pub fn temp_key(&self) -> String {
        let n = self.inner.next_temp.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.inner.config.temp_key_prefix, n)
    }

    /// Whether `key` looks like one handed out by [`temp_key`](Self::temp_key).
    pub fn is_temp_key(&self, key: &str) -> bool {
        key.strip_prefix(self.inner.config.temp_key_prefix.as_str())
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }

    // --- Base Feed ---

    /// Replace the confirmed collection.
    ///
    /// Keys without a pending mutation take their value (and order) from
    /// `records`. Pending keys keep their optimistic value.
    pub fn replace_base(&self, records: Vec<T>) {
        let (len, shielded) = {
            let mut state = self.inner.state.write();
            let shielded = state.replace_base(self.inner.identity.as_ref(), records);
            (state.merged().len(), shielded)
        };

        tracing::debug!(store = %self.inner.config.name, len, shielded, "base replaced");
        self.inner
            .subscriptions
            .broadcast(StoreEvent::BaseReplaced { len, shielded });
    }

    // --- Mutations ---

    /// Optimistically add `record` at the front of the view, then run `remote`.
    ///
    /// `record` may carry a placeholder key (see [`temp_key`](Self::temp_key)).
    /// On success the placeholder is replaced by the authoritative record,
    /// whose key may differ. On failure the placeholder is removed.
    pub fn add<F, E>(
        &self,
        record: T,
        remote: F,
    ) -> impl Future<Output = Result<T, MutationError<E>>>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let begun = self.begin(MutationKind::Add, |state, identity| {
            state.apply_add(identity, record).map(Some)
        });

        async move {
            let ticket = match begun {
                Ok(ticket) => ticket,
                Err(e) => return Err(MutationError::Store(e)),
            };
            match (remote.await, ticket) {
                (Ok(confirmed), Some(ticket)) => {
                    ticket.commit(Some(confirmed.clone()));
                    Ok(confirmed)
                }
                (Err(e), Some(ticket)) => {
                    ticket.reject(&e);
                    Err(MutationError::Remote(e))
                }
                (result, None) => result.map_err(MutationError::Remote),
            }
        }
    }

    /// Optimistically overlay `patch` on the record at `key`, then run `remote`.
    ///
    /// On success the record is replaced by the authoritative one; on
    /// failure it is restored to its value before the call. If no record
    /// has `key`, `remote` runs without any optimistic bookkeeping.
    pub fn update<P, F, E>(
        &self,
        key: &str,
        patch: P,
        remote: F,
    ) -> impl Future<Output = Result<T, MutationError<E>>>
    where
        P: Patch<T>,
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let begun = self.begin(MutationKind::Update, |state, identity| {
            let tracked = state.apply_update(identity, key, &patch)?;
            Ok(tracked.then(|| key.to_string()))
        });

        async move {
            let ticket = match begun {
                Ok(ticket) => ticket,
                Err(e) => return Err(MutationError::Store(e)),
            };
            match (remote.await, ticket) {
                (Ok(confirmed), Some(ticket)) => {
                    ticket.commit(Some(confirmed.clone()));
                    Ok(confirmed)
                }
                (Err(e), Some(ticket)) => {
                    ticket.reject(&e);
                    Err(MutationError::Remote(e))
                }
                (result, None) => result.map_err(MutationError::Remote),
            }
        }
    }

    /// Optimistically remove the record at `key`, then run `remote`.
    ///
    /// On failure the record is reinserted at the front of the view. If no
    /// record has `key`, `remote` runs without any optimistic bookkeeping.
    pub fn delete<F, E>(
        &self,
        key: &str,
        remote: F,
    ) -> impl Future<Output = Result<(), MutationError<E>>>
    where
        F: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let begun = self.begin(MutationKind::Delete, |state, identity| {
            let tracked = state.apply_delete(identity, key)?;
            Ok(tracked.then(|| key.to_string()))
        });

        async move {
            let ticket = match begun {
                Ok(ticket) => ticket,
                Err(e) => return Err(MutationError::Store(e)),
            };
            match (remote.await, ticket) {
                (Ok(()), Some(ticket)) => {
                    ticket.commit(None);
                    Ok(())
                }
                (Err(e), Some(ticket)) => {
                    ticket.reject(&e);
                    Err(MutationError::Remote(e))
                }
                (result, None) => result.map_err(MutationError::Remote),
            }
        }
    }

    /// Run the optimistic step of a mutation. `apply` returns the tracked
    /// key, or `None` if the mutation isn't tracked.
    fn begin<A>(&self, kind: MutationKind, apply: A) -> Result<Option<Ticket<T>>, StoreError>
    where
        A: FnOnce(&mut OverlayState<T>, &dyn Identity<T>) -> Result<Option<String>, StoreError>,
    {
        let applied = {
            let mut state = self.inner.state.write();
            apply(&mut *state, self.inner.identity.as_ref())
        };

        match applied {
            Ok(Some(key)) => {
                tracing::debug!(
                    store = %self.inner.config.name,
                    key = %key,
                    %kind,
                    "optimistic mutation applied"
                );
                self.inner.subscriptions.broadcast(StoreEvent::Applied {
                    key: key.clone(),
                    kind,
                });
                Ok(Some(Ticket {
                    store: self.clone(),
                    key,
                    settled: false,
                }))
            }
            Ok(None) => {
                tracing::debug!(
                    store = %self.inner.config.name,
                    %kind,
                    "key not in view, running remote operation untracked"
                );
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    store = %self.inner.config.name,
                    %kind,
                    error = %e,
                    "mutation refused"
                );
                Err(e)
            }
        }
    }

    fn settle_commit(&self, key: &str, confirmed: Option<T>) {
        let confirmed_key = confirmed
            .as_ref()
            .and_then(|record| self.inner.identity.key(record))
            .map(str::to_owned);

        let kind = {
            let mut state = self.inner.state.write();
            state.commit(self.inner.identity.as_ref(), key, confirmed)
        };

        if let Some(kind) = kind {
            tracing::debug!(store = %self.inner.config.name, key, %kind, "mutation committed");
            self.inner.subscriptions.broadcast(StoreEvent::Committed {
                key: key.to_string(),
                confirmed_key,
                kind,
            });
        }
    }

    fn settle_rollback(&self, key: &str, reason: RollbackReason) {
        let kind = {
            let mut state = self.inner.state.write();
            state.rollback(self.inner.identity.as_ref(), key)
        };

        if let Some(kind) = kind {
            tracing::warn!(
                store = %self.inner.config.name,
                key,
                %kind,
                ?reason,
                "mutation rolled back"
            );
            self.inner.subscriptions.broadcast(StoreEvent::RolledBack {
                key: key.to_string(),
                kind,
                reason,
            });
        }
    }

    // --- Subscriptions ---

    /// Subscribe to change notifications.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.inner.subscriptions.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.subscriptions.unsubscribe(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.subscription_count()
    }
}

/// An applied optimistic mutation awaiting its remote outcome.
///
/// Rolls the overlay back if dropped unsettled.
struct Ticket<T: Clone + 'static> {
    store: OptimisticStore<T>,
    key: String,
    settled: bool,
}

impl<T: Clone + 'static> Ticket<T> {
    fn commit(mut self, confirmed: Option<T>) {
        self.settled = true;
        self.store.settle_commit(&self.key, confirmed);
    }

    fn reject<E: fmt::Display>(mut self, error: &E) {
        self.settled = true;
        self.store.settle_rollback(
            &self.key,
            RollbackReason::Rejected {
                message: error.to_string(),
            },
        );
    }
}

impl<T: Clone + 'static> Drop for Ticket<T> {
    fn drop(&mut self) {
        if !self.settled {
            self.store.settle_rollback(&self.key, RollbackReason::Abandoned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_temp_keys_are_unique_and_recognizable() {
        let store = OptimisticStore::json("id");
        let a = store.temp_key();
        let b = store.temp_key();
        assert_ne!(a, b);
        assert!(store.is_temp_key(&a));
        assert!(!store.is_temp_key("usr_1"));
        assert!(!store.is_temp_key("temp-"));
        assert!(!store.is_temp_key("temp-abc"));
    }

    #[test]
    fn test_custom_temp_prefix() {
        let store = OptimisticStore::with_config(
            Field::new("id"),
            StoreConfig {
                name: "gems".into(),
                temp_key_prefix: "pending_".into(),
            },
        );
        assert_eq!(store.temp_key(), "pending_1");
        assert!(store.is_temp_key("pending_42"));
        assert!(!store.is_temp_key("temp-1"));
    }

    #[test]
    fn test_clones_share_state() {
        let store = OptimisticStore::json("id");
        let other = store.clone();
        store.replace_base(vec![json!({"id": "a"})]);
        assert_eq!(other.len(), 1);
        assert_eq!(other.get("a"), Some(json!({"id": "a"})));
        assert!(other.get("b").is_none());
    }

    #[test]
    fn test_dropped_future_rolls_back() {
        let store = OptimisticStore::json("id");
        store.replace_base(vec![json!({"id": "a", "v": 1})]);

        let pending = store.update(
            "a",
            json!({"v": 2}),
            std::future::pending::<Result<Value, String>>(),
        );
        assert!(store.is_pending("a"));
        assert_eq!(store.get("a").unwrap()["v"], 2);

        drop(pending);
        assert!(!store.is_pending("a"));
        assert_eq!(store.get("a").unwrap()["v"], 1);
    }
}
