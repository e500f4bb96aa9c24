//! String-keyed ordered maps.

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{RunResult, ScriptError};
use crate::ops::value_equal;
use crate::value::Value;

/// An ordered mapping from string keys to values.
///
/// All reads and writes go through the readers-writer lock, so maps may be
/// shared across script threads. Iteration yields keys in insertion order.
#[derive(Debug, Default)]
pub struct ScriptMap {
    entries: RwLock<IndexMap<String, Value>>,
}

impl ScriptMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: IndexMap<String, Value>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn get(&self, key: &str) -> RunResult<Value> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ScriptError::key(format!("Could not find key={key} in map")))
    }

    pub fn try_get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }

    /// Removes and returns the value stored under `key`.
    pub fn pop(&self, key: &str) -> RunResult<Value> {
        self.entries
            .write()
            .shift_remove(key)
            .ok_or_else(|| ScriptError::key(format!("Could not find key={key} in map")))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Snapshot of the entries in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Copies every entry of `other` into this map, overwriting existing keys.
    pub fn merge_from(&self, other: &Self) {
        let source = other.snapshot();
        let mut entries = self.entries.write();
        for (key, value) in source {
            entries.insert(key, value);
        }
    }

    /// Order-insensitive equality: same key set, equal values.
    pub fn equals(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let ours = self.snapshot();
        for (key, value) in ours {
            match other.try_get(&key) {
                Some(theirs) => {
                    if !value_equal(&value, &theirs) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }

    pub fn to_json(&self) -> serde_json::Value {
        let entries = self.entries.read();
        let mut map = serde_json::Map::with_capacity(entries.len());
        for (key, value) in entries.iter() {
            map.insert(key.clone(), value.to_json());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_order_is_insertion_order() {
        let m = ScriptMap::new();
        m.set("b", Value::Int64(1));
        m.set("a", Value::Int64(2));
        m.set("c", Value::Int64(3));
        assert_eq!(m.keys(), vec!["b", "a", "c"]);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let m1 = ScriptMap::new();
        m1.set("x", Value::Int64(1));
        m1.set("y", Value::Int64(2));
        let m2 = ScriptMap::new();
        m2.set("y", Value::Int64(2));
        m2.set("x", Value::Int64(1));
        assert!(m1.equals(&m2));
        m2.set("x", Value::Int64(9));
        assert!(!m1.equals(&m2));
    }

    #[test]
    fn pop_removes_entry() {
        let m = ScriptMap::new();
        m.set("k", Value::Int64(7));
        assert_eq!(m.pop("k").unwrap(), Value::Int64(7));
        assert!(m.pop("k").is_err());
    }
}
