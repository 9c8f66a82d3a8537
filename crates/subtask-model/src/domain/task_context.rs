use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Opaque key–value bag attached to a task.
///
/// The engine never interprets the entries; they are forwarded to the
/// executor and echoed back in results. Internally stored as a list of
/// key–value pairs and serialized as a transparent array wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskContext(pub Vec<KeyValue>);

impl TaskContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a context containing a single key–value pair.
    pub fn single<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(vec![KeyValue::new(key, value)])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all key–value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the value for a key, returning the last matching entry.
    ///
    /// Scanning from the end gives simple override semantics when contexts
    /// are merged.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append a key–value pair.
    ///
    /// Later entries override earlier ones when queried via [`TaskContext::get`].
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Merge two contexts, where entries from `other` override earlier ones.
    pub fn merged(&self, other: &TaskContext) -> TaskContext {
        let mut out = self.0.clone();
        out.extend(other.0.clone());
        TaskContext(out)
    }
}
