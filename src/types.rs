//! Core types for the optimistic store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Extracts the identity value of a record.
///
/// The store is generic over the record shape; the identity accessor is the
/// only thing it needs to know about a record. Keys are compared as strings.
pub trait Identity<T>: Send + Sync + 'static {
    /// The identity value of `record`, or `None` if it has none.
    fn key<'r>(&self, record: &'r T) -> Option<&'r str>;
}

/// Records that carry their own identity.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Identity taken from [`Identified::id`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ById;

impl<T: Identified> Identity<T> for ById {
    fn key<'r>(&self, record: &'r T) -> Option<&'r str> {
        Some(record.id())
    }
}

/// Identity taken from a named string field of a JSON object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field(String);

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Field(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Identity<Value> for Field {
    fn key<'r>(&self, record: &'r Value) -> Option<&'r str> {
        record.get(&self.0)?.as_str()
    }
}

/// A partial set of field overrides applied on top of a record.
pub trait Patch<T> {
    fn apply_to(&self, record: &mut T);
}

/// Shallow merge: every field of the patch object overwrites the record's.
/// A non-object patch replaces the record wholesale.
impl Patch<Value> for Value {
    fn apply_to(&self, record: &mut Value) {
        match (record, self) {
            (Value::Object(target), Value::Object(fields)) => {
                for (name, value) in fields {
                    target.insert(name.clone(), value.clone());
                }
            }
            (record, patch) => *record = patch.clone(),
        }
    }
}

/// Kind of optimistic mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::Add => "add",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub base_len: usize,
    pub merged_len: usize,
    pub pending_adds: usize,
    pub pending_updates: usize,
    pub pending_deletes: usize,
}

impl StoreStats {
    pub fn pending_total(&self) -> usize {
        self.pending_adds + self.pending_updates + self.pending_deletes
    }
}
