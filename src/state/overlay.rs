//! Overlay state: the confirmed base, the merged view, and pending mutations.
//!
//! Every method here is one synchronous transition. The store holds the
//! state behind a lock for the duration of a single call and never across
//! a remote operation.

use crate::error::{Result, StoreError};
use crate::types::{Identity, MutationKind, Patch, StoreStats};
use std::collections::{HashMap, HashSet};

/// Bookkeeping for one in-flight mutation.
#[derive(Clone, Debug)]
pub(crate) enum Pending<T> {
    Add,
    Update { original: T },
    Delete { original: T },
}

impl<T> Pending<T> {
    pub(crate) fn kind(&self) -> MutationKind {
        match self {
            Pending::Add => MutationKind::Add,
            Pending::Update { .. } => MutationKind::Update,
            Pending::Delete { .. } => MutationKind::Delete,
        }
    }
}

pub(crate) struct OverlayState<T> {
    base: Vec<T>,
    merged: Vec<T>,
    pending: HashMap<String, Pending<T>>,
}

impl<T: Clone + 'static> OverlayState<T> {
    pub(crate) fn new() -> Self {
        Self {
            base: Vec::new(),
            merged: Vec::new(),
            pending: HashMap::new(),
        }
    }

    pub(crate) fn merged(&self) -> &[T] {
        &self.merged
    }

    pub(crate) fn base(&self) -> &[T] {
        &self.base
    }

    pub(crate) fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.pending.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn get(&self, identity: &dyn Identity<T>, key: &str) -> Option<&T> {
        self.position(identity, key).map(|idx| &self.merged[idx])
    }

    pub(crate) fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            base_len: self.base.len(),
            merged_len: self.merged.len(),
            ..Default::default()
        };
        for pending in self.pending.values() {
            match pending.kind() {
                MutationKind::Add => stats.pending_adds += 1,
                MutationKind::Update => stats.pending_updates += 1,
                MutationKind::Delete => stats.pending_deletes += 1,
            }
        }
        stats
    }

    fn position(&self, identity: &dyn Identity<T>, key: &str) -> Option<usize> {
        self.merged
            .iter()
            .position(|record| identity.key(record) == Some(key))
    }

    /// Put `record` where `key` currently sits, or at the front if absent.
    fn put(&mut self, identity: &dyn Identity<T>, key: &str, record: T) {
        match self.position(identity, key) {
            Some(idx) => self.merged[idx] = record,
            None => self.merged.insert(0, record),
        }
    }

    // --- Base Feed ---

    /// Replace the confirmed collection and rebuild the merged view.
    ///
    /// Returns the number of base records overridden or suppressed by a
    /// pending mutation.
    pub(crate) fn replace_base(&mut self, identity: &dyn Identity<T>, records: Vec<T>) -> usize {
        let mut merged = Vec::with_capacity(records.len() + self.pending.len());
        let mut optimistic: HashMap<String, T> = HashMap::new();

        if !self.pending.is_empty() {
            let base_keys: HashSet<&str> =
                records.iter().filter_map(|r| identity.key(r)).collect();

            // Pending adds/updates the new base doesn't know about stay in
            // front, in their current relative order.
            for record in self.merged.drain(..) {
                let Some(key) = identity.key(&record).map(str::to_owned) else {
                    continue;
                };
                if matches!(
                    self.pending.get(&key),
                    Some(Pending::Add) | Some(Pending::Update { .. })
                ) {
                    if base_keys.contains(key.as_str()) {
                        optimistic.insert(key, record);
                    } else {
                        merged.push(record);
                    }
                }
            }
        }

        let mut shielded = 0;
        for record in &records {
            let pending = identity
                .key(record)
                .and_then(|key| self.pending.get(key).map(|p| (key, p)));
            match pending {
                None => merged.push(record.clone()),
                Some((_, Pending::Delete { .. })) => shielded += 1,
                Some((key, _)) => match optimistic.remove(key) {
                    Some(value) => {
                        shielded += 1;
                        merged.push(value);
                    }
                    None => merged.push(record.clone()),
                },
            }
        }

        self.base = records;
        self.merged = merged;
        shielded
    }

    // --- Optimistic Apply ---

    fn check_free(&self, key: &str) -> Result<()> {
        if self.pending.contains_key(key) {
            return Err(StoreError::KeyPending(key.to_string()));
        }
        Ok(())
    }

    /// Insert a tentative record at the front. Returns its key.
    pub(crate) fn apply_add(&mut self, identity: &dyn Identity<T>, record: T) -> Result<String> {
        let key = identity
            .key(&record)
            .map(str::to_owned)
            .ok_or(StoreError::MissingIdentity)?;
        self.check_free(&key)?;
        if self.position(identity, &key).is_some() {
            return Err(StoreError::DuplicateKey(key));
        }

        self.merged.insert(0, record);
        self.pending.insert(key.clone(), Pending::Add);
        Ok(key)
    }

    /// Overlay `patch` on the record at `key`. Returns false if no such
    /// record exists, in which case nothing is tracked.
    pub(crate) fn apply_update<P: Patch<T>>(
        &mut self,
        identity: &dyn Identity<T>,
        key: &str,
        patch: &P,
    ) -> Result<bool> {
        self.check_free(key)?;
        let Some(idx) = self.position(identity, key) else {
            return Ok(false);
        };

        let original = self.merged[idx].clone();
        patch.apply_to(&mut self.merged[idx]);
        if identity.key(&self.merged[idx]) != Some(key) {
            self.merged[idx] = original;
            return Err(StoreError::IdentityChanged(key.to_string()));
        }
        self.pending.insert(key.to_string(), Pending::Update { original });
        Ok(true)
    }

    /// Remove the record at `key`. Returns false if no such record exists.
    pub(crate) fn apply_delete(&mut self, identity: &dyn Identity<T>, key: &str) -> Result<bool> {
        self.check_free(key)?;
        let Some(idx) = self.position(identity, key) else {
            return Ok(false);
        };

        let original = self.merged.remove(idx);
        self.pending
            .insert(key.to_string(), Pending::Delete { original });
        Ok(true)
    }

    // --- Reconciliation ---

    /// Settle a successful mutation. `confirmed` is the authoritative record
    /// for adds and updates, `None` for deletes.
    ///
    /// Returns the kind of the settled mutation, or `None` if `key` was not
    /// pending.
    pub(crate) fn commit(
        &mut self,
        identity: &dyn Identity<T>,
        key: &str,
        confirmed: Option<T>,
    ) -> Option<MutationKind> {
        let kind = self.pending.remove(key)?.kind();

        if let Some(record) = confirmed {
            if kind == MutationKind::Add {
                // The feed may already have delivered the confirmed record.
                if let Some(real) = identity.key(&record).filter(|real| *real != key) {
                    let real = real.to_owned();
                    self.merged.retain(|r| identity.key(r) != Some(real.as_str()));
                }
            }
            if kind != MutationKind::Delete {
                self.put(identity, key, record);
            }
        }

        Some(kind)
    }

    /// Undo a mutation whose remote operation failed or was abandoned.
    pub(crate) fn rollback(
        &mut self,
        identity: &dyn Identity<T>,
        key: &str,
    ) -> Option<MutationKind> {
        let pending = self.pending.remove(key)?;
        let kind = pending.kind();

        match pending {
            Pending::Add => self.merged.retain(|r| identity.key(r) != Some(key)),
            Pending::Update { original } => self.put(identity, key, original),
            Pending::Delete { original } => self.put(identity, key, original),
        }

        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;
    use serde_json::{json, Value};

    fn ids(state: &OverlayState<Value>) -> Vec<&str> {
        state
            .merged()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect()
    }

    fn state_with(records: Vec<Value>) -> (OverlayState<Value>, Field) {
        let field = Field::new("id");
        let mut state = OverlayState::new();
        state.replace_base(&field, records);
        (state, field)
    }

    #[test]
    fn test_replace_base_without_pending_is_verbatim() {
        let records = vec![json!({"id": "b"}), json!({"id": "a"}), json!({"name": "anon"})];
        let (mut state, field) = state_with(records.clone());
        assert_eq!(state.merged(), records.as_slice());

        assert_eq!(state.replace_base(&field, records.clone()), 0);
        assert_eq!(state.merged(), records.as_slice());
        assert_eq!(state.base(), records.as_slice());
    }

    #[test]
    fn test_pending_update_shields_base_value() {
        let (mut state, field) =
            state_with(vec![json!({"id": "a", "v": 1}), json!({"id": "b", "v": 1})]);
        assert!(state.apply_update(&field, "a", &json!({"v": 2})).unwrap());

        let shielded = state.replace_base(
            &field,
            vec![json!({"id": "b", "v": 5}), json!({"id": "a", "v": 9})],
        );
        assert_eq!(shielded, 1);
        assert_eq!(
            state.merged(),
            &[json!({"id": "b", "v": 5}), json!({"id": "a", "v": 2})]
        );
    }

    #[test]
    fn test_pending_delete_suppresses_base_value() {
        let (mut state, field) = state_with(vec![json!({"id": "a"}), json!({"id": "b"})]);
        assert!(state.apply_delete(&field, "a").unwrap());

        let next = vec![json!({"id": "a"}), json!({"id": "b"}), json!({"id": "c"})];
        state.replace_base(&field, next);
        assert_eq!(ids(&state), vec!["b", "c"]);

        state.rollback(&field, "a");
        assert_eq!(ids(&state), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_pending_add_survives_base_replacement() {
        let (mut state, field) = state_with(vec![json!({"id": "a"})]);
        state.apply_add(&field, json!({"id": "temp-1"})).unwrap();
        state.apply_add(&field, json!({"id": "temp-2"})).unwrap();

        state.replace_base(&field, vec![json!({"id": "a"}), json!({"id": "b"})]);
        assert_eq!(ids(&state), vec!["temp-2", "temp-1", "a", "b"]);
    }

    #[test]
    fn test_pending_update_missing_from_base_stays_in_front() {
        let (mut state, field) = state_with(vec![json!({"id": "a", "v": 1}), json!({"id": "b"})]);
        state.apply_update(&field, "b", &json!({"v": 2})).unwrap();

        state.replace_base(&field, vec![json!({"id": "a", "v": 1}), json!({"id": "c"})]);
        assert_eq!(ids(&state), vec!["b", "a", "c"]);
        assert_eq!(state.get(&field, "b").unwrap()["v"], 2);

        state.rollback(&field, "b");
        assert_eq!(ids(&state), vec!["b", "a", "c"]);
        assert_eq!(state.get(&field, "b"), Some(&json!({"id": "b"})));
    }

    #[test]
    fn test_commit_update_missing_from_base_stays_in_front() {
        let (mut state, field) = state_with(vec![json!({"id": "a"}), json!({"id": "b"})]);
        state.apply_update(&field, "b", &json!({"v": 2})).unwrap();

        state.replace_base(&field, vec![json!({"id": "a"})]);
        assert_eq!(ids(&state), vec!["b", "a"]);

        let kind = state.commit(&field, "b", Some(json!({"id": "b", "v": 3})));
        assert_eq!(kind, Some(MutationKind::Update));
        assert_eq!(state.merged(), &[json!({"id": "b", "v": 3}), json!({"id": "a"})]);
        assert!(!state.is_pending("b"));
    }

    #[test]
    fn test_commit_update_inserts_at_front_when_entry_gone() {
        let (mut state, field) = state_with(vec![json!({"id": "a"}), json!({"id": "b", "v": 1})]);
        state.apply_update(&field, "b", &json!({"v": 2})).unwrap();

        // Entry vanished from the view while the update was in flight.
        state.merged.retain(|r| r["id"] != "b");

        state.commit(&field, "b", Some(json!({"id": "b", "v": 3})));
        assert_eq!(state.merged(), &[json!({"id": "b", "v": 3}), json!({"id": "a"})]);
    }

    #[test]
    fn test_update_refuses_identity_change() {
        let (mut state, field) = state_with(vec![json!({"id": "a", "v": 1})]);

        assert_eq!(
            state.apply_update(&field, "a", &json!({"id": "b"})),
            Err(StoreError::IdentityChanged("a".into()))
        );
        assert_eq!(state.merged(), &[json!({"id": "a", "v": 1})]);
        assert!(!state.is_pending("a"));

        // The key is still usable and still shielded once a valid update runs.
        assert!(state.apply_update(&field, "a", &json!({"v": 2})).unwrap());
        state.replace_base(&field, vec![json!({"id": "a", "v": 9})]);
        assert_eq!(state.merged(), &[json!({"id": "a", "v": 2})]);
    }

    #[test]
    fn test_commit_add_substitutes_in_place() {
        let (mut state, field) = state_with(vec![json!({"id": "a"})]);
        state.apply_add(&field, json!({"id": "temp-1", "name": "X"})).unwrap();

        let confirmed = json!({"id": "real-7", "name": "X"});
        let kind = state.commit(&field, "temp-1", Some(confirmed));
        assert_eq!(kind, Some(MutationKind::Add));
        assert_eq!(ids(&state), vec!["real-7", "a"]);
        assert!(!state.is_pending("temp-1"));
    }

    #[test]
    fn test_commit_add_dedups_record_delivered_by_feed() {
        let (mut state, field) = state_with(vec![json!({"id": "a"})]);
        state.apply_add(&field, json!({"id": "temp-1"})).unwrap();

        // Feed pushes the created record before the remote call returns.
        state.replace_base(&field, vec![json!({"id": "real-7"}), json!({"id": "a"})]);
        assert_eq!(ids(&state), vec!["temp-1", "real-7", "a"]);

        state.commit(&field, "temp-1", Some(json!({"id": "real-7"})));
        assert_eq!(ids(&state), vec!["real-7", "a"]);
    }

    #[test]
    fn test_rollback_update_restores_snapshot() {
        let (mut state, field) = state_with(vec![json!({"id": "a", "credits": 100})]);
        state.apply_update(&field, "a", &json!({"credits": 150})).unwrap();
        assert_eq!(state.get(&field, "a").unwrap()["credits"], 150);

        assert_eq!(state.rollback(&field, "a"), Some(MutationKind::Update));
        assert_eq!(state.get(&field, "a").unwrap()["credits"], 100);
        assert_eq!(state.rollback(&field, "a"), None);
    }

    #[test]
    fn test_missing_key_is_not_tracked() {
        let (mut state, field) = state_with(vec![json!({"id": "a"})]);
        assert!(!state.apply_update(&field, "missing", &json!({"v": 1})).unwrap());
        assert!(!state.apply_delete(&field, "missing").unwrap());
        assert_eq!(state.pending_len(), 0);
        assert_eq!(ids(&state), vec!["a"]);
    }

    #[test]
    fn test_refuses_overlapping_and_duplicate() {
        let (mut state, field) = state_with(vec![json!({"id": "a"})]);
        state.apply_update(&field, "a", &json!({"v": 1})).unwrap();

        assert_eq!(
            state.apply_delete(&field, "a"),
            Err(StoreError::KeyPending("a".into()))
        );
        assert_eq!(
            state.apply_update(&field, "a", &json!({"v": 2})),
            Err(StoreError::KeyPending("a".into()))
        );
        assert_eq!(
            state.apply_add(&field, json!({"name": "no id"})),
            Err(StoreError::MissingIdentity)
        );

        state.commit(&field, "a", Some(json!({"id": "a", "v": 1})));
        assert_eq!(
            state.apply_add(&field, json!({"id": "a"})),
            Err(StoreError::DuplicateKey("a".into()))
        );
    }

    #[test]
    fn test_stats() {
        let (mut state, field) = state_with(vec![json!({"id": "a"}), json!({"id": "b"})]);
        state.apply_add(&field, json!({"id": "temp-1"})).unwrap();
        state.apply_delete(&field, "b").unwrap();

        let stats = state.stats();
        assert_eq!(stats.base_len, 2);
        assert_eq!(stats.merged_len, 2);
        assert_eq!(stats.pending_adds, 1);
        assert_eq!(stats.pending_deletes, 1);
        assert_eq!(stats.pending_total(), 2);
        assert_eq!(state.pending_keys(), vec!["b".to_string(), "temp-1".to_string()]);
    }
}
