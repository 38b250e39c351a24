use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::realtime::{PresenceSet, RealtimeStore, SubscriptionId};

pub fn overrides_key(seed: i64) -> String {
    format!("plans/{}/overrides", seed)
}

pub fn presence_key(seed: i64) -> String {
    format!("plans/{}/presence", seed)
}

/// Snapshot of one seed's shared state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub seed: i64,
    pub serialized_overrides: String,
    pub presence: PresenceSet,
}

impl SyncState {
    pub fn read(store: &dyn RealtimeStore, seed: i64) -> Self {
        Self {
            seed,
            serialized_overrides: store.read(&overrides_key(seed)).unwrap_or_default(),
            presence: store.presence(&presence_key(seed)),
        }
    }
}

/// Shared serialized-override value for one seed.
///
/// Dropping the channel cancels its subscription.
pub struct SyncChannel {
    store: Arc<dyn RealtimeStore>,
    seed: i64,
    subscription: Option<SubscriptionId>,
}

impl SyncChannel {
    pub fn new(store: Arc<dyn RealtimeStore>, seed: i64) -> Self {
        Self {
            store,
            seed,
            subscription: None,
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Fire-and-forget; failures are logged, never retried
    pub fn publish(&self, serialized: &str) {
        if let Err(e) = self.store.write(&overrides_key(self.seed), serialized) {
            warn!("Failed to publish overrides for seed {}: {}", self.seed, e);
        }
    }

    pub fn latest(&self) -> Option<String> {
        self.store.read(&overrides_key(self.seed))
    }

    /// Replaces any previous subscription
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.unsubscribe();
        let id = self
            .store
            .on_value_change(&overrides_key(self.seed), Arc::new(callback));
        debug!("Subscribed to overrides for seed {}", self.seed);
        self.subscription = Some(id);
    }

    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
            debug!("Unsubscribed from overrides for seed {}", self.seed);
        }
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
