// Local Replica Store
//
// Plain in-memory string map backing one replica. The empty string is
// reserved as the "missing" sentinel at the read interface, matching
// the wire encoding of READREPLY.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct KeyValueStore {
    table: HashMap<String, String>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Always succeeds.
    pub fn create(&mut self, key: &str, value: &str) -> bool {
        self.table.insert(key.to_string(), value.to_string());
        true
    }

    /// The stored value, or the empty string when the key is absent.
    pub fn read(&self, key: &str) -> String {
        self.table.get(key).cloned().unwrap_or_default()
    }

    /// Overwrite iff present.
    pub fn update(&mut self, key: &str, value: &str) -> bool {
        match self.table.get_mut(key) {
            Some(slot) => {
                *slot = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Erase iff present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.table.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &String)> {
        self.table.iter()
    }
}
