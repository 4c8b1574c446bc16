//! Cached objects.

use std::collections::HashMap;

use sqlrepr::value::SqlValue;

use crate::key::CacheKey;

/// Reference from one cached object to an entry of another cache, by name
/// and key. Kept as a (cache, key) pair rather than a live object so
/// cyclic references cannot form ownership cycles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheRef {
    pub cache: String,
    pub key: CacheKey,
}

/// One cached row-derived object.
#[derive(Debug, Clone)]
pub struct CachedObject {
    key: CacheKey,
    /// Own column values, keyed by lowercased column name.
    fields: HashMap<String, SqlValue>,
    /// Resolved foreign-key references; `None` for a NULL foreign key.
    refs: HashMap<String, Option<CacheRef>>,
}

impl CachedObject {
    pub(crate) fn new(key: CacheKey) -> CachedObject {
        CachedObject {
            key,
            fields: HashMap::new(),
            refs: HashMap::new(),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn field(&self, column: &str) -> Option<&SqlValue> {
        self.fields.get(&column.to_ascii_lowercase())
    }

    pub fn reference(&self, column: &str) -> Option<&Option<CacheRef>> {
        self.refs.get(&column.to_ascii_lowercase())
    }

    pub(crate) fn set_field(&mut self, column: &str, value: SqlValue) {
        self.fields.insert(column.to_ascii_lowercase(), value);
    }

    pub(crate) fn set_reference(&mut self, column: &str, target: Option<CacheRef>) {
        self.refs.insert(column.to_ascii_lowercase(), target);
    }
}
