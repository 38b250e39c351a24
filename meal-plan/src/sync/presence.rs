use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::channel::presence_key;
use super::realtime::{PresenceRecord, PresenceSet, RealtimeStore, SubscriptionId, ViewerId};

/// A viewer as reported to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerPresence {
    pub viewer_id: ViewerId,
    pub display_name: String,
    pub avatar_ref: String,
}

pub fn viewers(set: &PresenceSet) -> Vec<ViewerPresence> {
    set.iter()
        .map(|(viewer_id, record)| ViewerPresence {
            viewer_id: viewer_id.clone(),
            display_name: record.display_name.clone(),
            avatar_ref: record.avatar_ref.clone(),
        })
        .collect()
}

/// This viewer's presence on one seed's channel.
///
/// The record is removed when the tracker is dropped, which is how a
/// disconnect surfaces to the other viewers.
pub struct PresenceTracker {
    store: Arc<dyn RealtimeStore>,
    seed: i64,
    viewer: ViewerId,
    joined: bool,
    subscription: Option<SubscriptionId>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn RealtimeStore>, seed: i64, viewer: impl Into<ViewerId>) -> Self {
        Self {
            store,
            seed,
            viewer: viewer.into(),
            joined: false,
            subscription: None,
        }
    }

    pub fn join(&mut self, record: PresenceRecord) {
        match self
            .store
            .presence_set(&presence_key(self.seed), &self.viewer, record)
        {
            Ok(()) => {
                self.joined = true;
                debug!("{} joined seed {}", self.viewer, self.seed);
            }
            Err(e) => warn!("Failed to record presence for {}: {}", self.viewer, e),
        }
    }

    /// Reports the full viewer collection now and on every change
    pub fn watch<F>(&mut self, callback: F)
    where
        F: Fn(Vec<ViewerPresence>) + Send + Sync + 'static,
    {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
        let id = self.store.on_presence_change(
            &presence_key(self.seed),
            Arc::new(move |set: &PresenceSet| callback(viewers(set))),
        );
        self.subscription = Some(id);
    }

    pub fn current(&self) -> Vec<ViewerPresence> {
        viewers(&self.store.presence(&presence_key(self.seed)))
    }

    pub fn leave(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
        if self.joined {
            self.store.presence_remove(&presence_key(self.seed), &self.viewer);
            self.joined = false;
            debug!("{} left seed {}", self.viewer, self.seed);
        }
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.leave();
    }
}
