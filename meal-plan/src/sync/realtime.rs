//! Realtime key-value store with ephemeral presence records

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;

pub type ViewerId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub display_name: String,
    pub avatar_ref: String,
}

pub type PresenceSet = BTreeMap<ViewerId, PresenceRecord>;

pub type ValueCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type PresenceCallback = Arc<dyn Fn(&PresenceSet) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Transport used for override sync and presence.
///
/// Subscribing delivers the current value (if any) immediately, then every
/// change. Writes are best-effort.
pub trait RealtimeStore: Send + Sync {
    fn write(&self, key: &str, value: &str) -> Result<()>;

    fn read(&self, key: &str) -> Option<String>;

    fn on_value_change(&self, key: &str, callback: ValueCallback) -> SubscriptionId;

    fn presence_set(&self, key: &str, viewer: &str, record: PresenceRecord) -> Result<()>;

    fn presence_remove(&self, key: &str, viewer: &str);

    fn presence(&self, key: &str) -> PresenceSet;

    fn on_presence_change(&self, key: &str, callback: PresenceCallback) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

#[derive(Default)]
struct Channels {
    values: HashMap<String, String>,
    /// Bumped on every accepted write
    versions: HashMap<String, u64>,
    presence: HashMap<String, PresenceSet>,
    value_subscribers: BTreeMap<SubscriptionId, (String, ValueCallback)>,
    presence_subscribers: BTreeMap<SubscriptionId, (String, PresenceCallback)>,
}

impl Channels {
    fn value_callbacks(&self, key: &str) -> Vec<ValueCallback> {
        self.value_subscribers
            .values()
            .filter(|(subscribed, _)| subscribed == key)
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    fn presence_callbacks(&self, key: &str) -> Vec<PresenceCallback> {
        self.presence_subscribers
            .values()
            .filter(|(subscribed, _)| subscribed == key)
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

/// In-process store shared by every viewer session of one server.
///
/// Callbacks run on the writer's thread after the internal lock is released,
/// so a callback may write back into the store. Subscribers are called in
/// subscription order, and a delivery stops as soon as a newer write to the
/// same key has landed, so nobody is handed a value older than one they have
/// already seen. Writers on different threads must still be serialized by the
/// caller for a strict delivery order; the web layer does this through its
/// session registry lock.
#[derive(Default)]
pub struct MemoryRealtime {
    channels: Mutex<Channels>,
    next_id: AtomicU64,
}

impl MemoryRealtime {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, key: &str, version: u64) -> bool {
        self.channels().versions.get(key) == Some(&version)
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn notify_presence(&self, key: &str) {
        let (snapshot, callbacks) = {
            let channels = self.channels();
            (
                channels.presence.get(key).cloned().unwrap_or_default(),
                channels.presence_callbacks(key),
            )
        };
        for callback in callbacks {
            callback(&snapshot);
        }
    }
}

impl RealtimeStore for MemoryRealtime {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        let (version, callbacks) = {
            let mut channels = self.channels();
            if channels.values.get(key).map(String::as_str) == Some(value) {
                return Ok(());
            }
            channels.values.insert(key.to_string(), value.to_string());
            let version = channels.versions.entry(key.to_string()).or_insert(0);
            *version += 1;
            let version = *version;
            (version, channels.value_callbacks(key))
        };
        debug!("{} <- '{}' ({} subscribers)", key, value, callbacks.len());
        for callback in callbacks {
            if !self.is_current(key, version) {
                debug!("{} superseded before delivery of '{}'", key, value);
                break;
            }
            callback(value);
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Option<String> {
        self.channels().values.get(key).cloned()
    }

    fn on_value_change(&self, key: &str, callback: ValueCallback) -> SubscriptionId {
        let id = self.next_id();
        let current = {
            let mut channels = self.channels();
            channels
                .value_subscribers
                .insert(id, (key.to_string(), Arc::clone(&callback)));
            channels.values.get(key).cloned()
        };
        if let Some(value) = current {
            callback(&value);
        }
        id
    }

    fn presence_set(&self, key: &str, viewer: &str, record: PresenceRecord) -> Result<()> {
        self.channels()
            .presence
            .entry(key.to_string())
            .or_default()
            .insert(viewer.to_string(), record);
        self.notify_presence(key);
        Ok(())
    }

    fn presence_remove(&self, key: &str, viewer: &str) {
        let removed = {
            let mut channels = self.channels();
            let removed = channels
                .presence
                .get_mut(key)
                .and_then(|viewers| viewers.remove(viewer))
                .is_some();
            if channels.presence.get(key).is_some_and(BTreeMap::is_empty) {
                channels.presence.remove(key);
            }
            removed
        };
        if removed {
            self.notify_presence(key);
        }
    }

    fn presence(&self, key: &str) -> PresenceSet {
        self.channels().presence.get(key).cloned().unwrap_or_default()
    }

    fn on_presence_change(&self, key: &str, callback: PresenceCallback) -> SubscriptionId {
        let id = self.next_id();
        let snapshot = {
            let mut channels = self.channels();
            channels
                .presence_subscribers
                .insert(id, (key.to_string(), Arc::clone(&callback)));
            channels.presence.get(key).cloned().unwrap_or_default()
        };
        callback(&snapshot);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut channels = self.channels();
        channels.value_subscribers.remove(&id);
        channels.presence_subscribers.remove(&id);
    }
}
