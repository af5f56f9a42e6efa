//! # Fact Store Interface
//!
//! The engine's only view of the external key/value + pub/sub store. The
//! dispatcher reads fact snapshots through [`FactStore::mget`] and writes
//! action results through [`FactStore::set_and_publish`]; updates arrive
//! over a subscription channel as [`FactUpdate`] messages.
//!
//! The store implementation owns its own synchronization; the engine
//! core holds it behind an `Arc<dyn FactStore>`. [`MemoryStore`] is the
//! in-process reference implementation used by the CLI runtime and the
//! test suite.

use crate::value::Value;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use thiserror::Error;

/// Channel updates are published on when the producer does not name one.
pub const DEFAULT_CHANNEL: &str = "facts";

/// Store operation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Operation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A fact update delivered over a subscription channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FactUpdate {
    pub channel: String,
    pub key: String,
    pub value: Value,
}

impl FactUpdate {
    /// Parse a raw `<key>=<literal>` transport message received on
    /// `channel`.
    pub fn parse(channel: &str, message: &str) -> Option<FactUpdate> {
        let (key, value) = crate::value::parse_update(message)?;
        Some(FactUpdate {
            channel: channel.to_string(),
            key,
            value,
        })
    }
}

/// Capabilities the engine requires of the external store.
pub trait FactStore: Send + Sync {
    /// Read one fact.
    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Read many facts at once; absent keys are simply missing from the
    /// returned map.
    fn mget(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>>;

    /// Write one fact.
    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Write one fact and notify subscribers. Stores without native
    /// publish fall back to a plain write.
    fn set_and_publish(&self, key: &str, value: Value) -> StoreResult<()> {
        self.set(key, value)
    }

    /// Subscribe to fact updates on the given channels.
    fn subscribe(&self, channels: &[String]) -> Receiver<FactUpdate>;
}

/// In-memory store with pub/sub.
#[derive(Default)]
pub struct MemoryStore {
    facts: RwLock<HashMap<String, Value>>,
    subscribers: Mutex<Vec<(Vec<String>, Sender<FactUpdate>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Publish an update to matching subscribers without touching the
    /// fact map. Used by transports feeding externally-produced updates.
    pub fn publish(&self, update: &FactUpdate) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(channels, sender)| {
            if channels.iter().any(|c| c == &update.channel) {
                sender.send(update.clone()).is_ok()
            } else {
                // Keep subscribers of other channels; their liveness is
                // checked when their channel fires.
                true
            }
        });
    }

    /// Number of facts currently stored.
    pub fn len(&self) -> usize {
        self.facts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.read().is_empty()
    }
}

impl FactStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.facts.read().get(key).cloned())
    }

    fn mget(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>> {
        let facts = self.facts.read();
        Ok(keys
            .iter()
            .filter_map(|key| facts.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.facts.write().insert(key.to_string(), value);
        Ok(())
    }

    fn set_and_publish(&self, key: &str, value: Value) -> StoreResult<()> {
        self.set(key, value.clone())?;
        self.publish(&FactUpdate {
            channel: DEFAULT_CHANNEL.to_string(),
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn subscribe(&self, channels: &[String]) -> Receiver<FactUpdate> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push((channels.to_vec(), tx));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("temperature"), Ok(None));

        store.set("temperature", Value::Float(21.5)).unwrap();
        assert_eq!(store.get("temperature"), Ok(Some(Value::Float(21.5))));

        store.set("temperature", Value::Float(22.0)).unwrap();
        assert_eq!(store.get("temperature"), Ok(Some(Value::Float(22.0))));
    }

    #[test]
    fn test_mget_skips_missing() {
        let store = MemoryStore::new();
        store.set("a", Value::Int(1)).unwrap();
        store.set("b", Value::Int(2)).unwrap();

        let keys = vec![String::from("a"), String::from("b"), String::from("c")];
        let snapshot = store.mget(&keys).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("a"), Some(&Value::Int(1)));
        assert!(!snapshot.contains_key("c"));
    }

    #[test]
    fn test_set_and_publish_reaches_subscribers() {
        let store = MemoryStore::new();
        let rx = store.subscribe(&[DEFAULT_CHANNEL.to_string()]);

        store.set_and_publish("temperature", Value::Float(30.11)).unwrap();

        let update = rx.try_recv().unwrap();
        assert_eq!(update.key, "temperature");
        assert_eq!(update.value, Value::Float(30.11));
        assert_eq!(update.channel, DEFAULT_CHANNEL);
    }

    #[test]
    fn test_subscribe_filters_channels() {
        let store = MemoryStore::new();
        let rx = store.subscribe(&[String::from("other")]);

        store.set_and_publish("temperature", Value::Int(1)).unwrap();
        assert!(rx.try_recv().is_err());

        store.publish(&FactUpdate {
            channel: String::from("other"),
            key: String::from("humidity"),
            value: Value::Int(2),
        });
        assert_eq!(rx.try_recv().unwrap().key, "humidity");
    }

    #[test]
    fn test_fact_update_parse() {
        let update = FactUpdate::parse("facts", "temperature=30.11").unwrap();
        assert_eq!(update.channel, "facts");
        assert_eq!(update.key, "temperature");
        assert_eq!(update.value, Value::Float(30.11));

        assert!(FactUpdate::parse("facts", "garbage").is_none());
    }
}
