use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::MenuConfig;
use crate::plan::{PlanMode, ScheduleEntry, ScheduleGenerator};
use crate::share::{self, MasterIndexLists, Override, OverrideStore, ShareLink};
use super::channel::{SyncChannel, SyncState};
use super::presence::{PresenceTracker, ViewerPresence};
use super::realtime::{PresenceRecord, RealtimeStore, ViewerId};

const EVENT_CAPACITY: usize = 64;

/// The opaque identity a viewer connects with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerIdentity {
    pub viewer_id: ViewerId,
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: String,
}

/// Re-render notifications for whoever displays this session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Rendered { seed: i64, overrides: String },
    Presence { viewers: Vec<ViewerPresence> },
}

#[derive(Debug)]
struct PlanState {
    seed: i64,
    start: NaiveDate,
    mode: PlanMode,
    baseline: Vec<ScheduleEntry>,
    overrides: OverrideStore,
}

/// Everything one viewer needs to display and edit a shared plan.
///
/// Holds the generated baseline, the local override map and the channel
/// bindings for the active seed. Remote values replace the whole override map
/// (last writer wins).
pub struct PlanSession {
    menu: Arc<MenuConfig>,
    lists: Arc<MasterIndexLists>,
    realtime: Arc<dyn RealtimeStore>,
    viewer: ViewerIdentity,
    state: Arc<Mutex<PlanState>>,
    events: broadcast::Sender<SessionEvent>,
    channel: Option<SyncChannel>,
    presence: Option<PresenceTracker>,
}

fn lock(state: &Mutex<PlanState>) -> MutexGuard<'_, PlanState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlanSession {
    /// Generates the baseline for `seed` without joining its channel
    pub fn new(
        menu: Arc<MenuConfig>,
        lists: Arc<MasterIndexLists>,
        realtime: Arc<dyn RealtimeStore>,
        viewer: ViewerIdentity,
        seed: i64,
        start: NaiveDate,
        mode: PlanMode,
    ) -> Self {
        let baseline = ScheduleGenerator::new(&menu).generate(seed, start, mode);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            menu,
            lists,
            realtime,
            viewer,
            state: Arc::new(Mutex::new(PlanState {
                seed,
                start,
                mode,
                baseline,
                overrides: OverrideStore::new(),
            })),
            events,
            channel: None,
            presence: None,
        }
    }

    /// Session for a shared link, joined to its channel
    pub fn from_link(
        menu: Arc<MenuConfig>,
        lists: Arc<MasterIndexLists>,
        realtime: Arc<dyn RealtimeStore>,
        viewer: ViewerIdentity,
        link: &ShareLink,
        default_start: NaiveDate,
    ) -> Self {
        let start = link.start.unwrap_or(default_start);
        let mode = link.mode.unwrap_or_default();
        let mut session = Self::new(menu, lists, realtime, viewer, link.seed, start, mode);
        if let Some(encoded) = link.overrides.as_deref() {
            let overrides = share::decode(encoded, &session.lists);
            lock(&session.state).overrides.replace_all(overrides);
        }
        session.join_channel();
        session
    }

    pub fn viewer(&self) -> &ViewerIdentity {
        &self.viewer
    }

    pub fn seed(&self) -> i64 {
        lock(&self.state).seed
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn baseline(&self) -> Vec<ScheduleEntry> {
        lock(&self.state).baseline.clone()
    }

    /// Baseline with the current overrides applied
    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        let state = lock(&self.state);
        state.overrides.apply(&state.baseline)
    }

    pub fn serialized_overrides(&self) -> String {
        lock(&self.state).overrides.serialize(&self.lists)
    }

    pub fn share_link(&self) -> ShareLink {
        let state = lock(&self.state);
        ShareLink::new(state.seed)
            .with_overrides(state.overrides.serialize(&self.lists))
            .with_window(state.start, state.mode)
    }

    pub fn sync_state(&self) -> SyncState {
        SyncState::read(self.realtime.as_ref(), self.seed())
    }

    pub fn viewers(&self) -> Vec<ViewerPresence> {
        self.presence
            .as_ref()
            .map(PresenceTracker::current)
            .unwrap_or_default()
    }

    /// Switches to a new seed: leaves the old channel first, regenerates the
    /// baseline with an empty override map, then joins the new channel.
    pub fn generate(&mut self, seed: i64, start: NaiveDate, mode: PlanMode) {
        self.leave_channel();
        let baseline = ScheduleGenerator::new(&self.menu).generate(seed, start, mode);
        {
            let mut state = lock(&self.state);
            *state = PlanState {
                seed,
                start,
                mode,
                baseline,
                overrides: OverrideStore::new(),
            };
        }
        self.join_channel();
        self.emit_rendered();
    }

    /// Opens a shared link: its window and overrides become local state, then
    /// the channel is joined (where an existing remote value wins).
    pub fn open_link(&mut self, link: &ShareLink, default_start: NaiveDate) {
        self.leave_channel();
        let start = link.start.unwrap_or(default_start);
        let mode = link.mode.unwrap_or_default();
        let baseline = ScheduleGenerator::new(&self.menu).generate(link.seed, start, mode);
        let overrides = link
            .overrides
            .as_deref()
            .map(|encoded| share::decode(encoded, &self.lists))
            .unwrap_or_default();
        {
            let mut state = lock(&self.state);
            *state = PlanState {
                seed: link.seed,
                start,
                mode,
                baseline,
                overrides: OverrideStore::from_map(overrides),
            };
        }
        self.join_channel();
        self.emit_rendered();
    }

    /// Subscribes to the active seed's override value and presence set
    pub fn join_channel(&mut self) {
        if self.channel.is_some() {
            return;
        }
        let seed = self.seed();

        let mut channel = SyncChannel::new(Arc::clone(&self.realtime), seed);
        let state = Arc::clone(&self.state);
        let lists = Arc::clone(&self.lists);
        let events = self.events.clone();
        channel.subscribe(move |remote| {
            if let Some(overrides) = reconcile(&state, &lists, seed, remote) {
                let _ = events.send(SessionEvent::Rendered { seed, overrides });
            }
        });

        // An empty channel adopts our local edits (e.g. from a share link)
        if channel.latest().is_none() {
            let local = self.serialized_overrides();
            if !local.is_empty() {
                channel.publish(&local);
            }
        }

        let mut presence = PresenceTracker::new(
            Arc::clone(&self.realtime),
            seed,
            self.viewer.viewer_id.clone(),
        );
        presence.join(PresenceRecord {
            display_name: self.viewer.display_name.clone(),
            avatar_ref: self.viewer.avatar_ref.clone(),
        });
        let events = self.events.clone();
        presence.watch(move |viewers| {
            let _ = events.send(SessionEvent::Presence { viewers });
        });

        info!("{} joined plan {}", self.viewer.viewer_id, seed);
        self.channel = Some(channel);
        self.presence = Some(presence);
    }

    /// Unsubscribes and removes this viewer's presence record
    pub fn leave_channel(&mut self) {
        let had_channel = self.channel.take().is_some();
        if let Some(mut presence) = self.presence.take() {
            presence.leave();
        }
        if had_channel {
            debug!("{} left plan {}", self.viewer.viewer_id, self.seed());
        }
    }

    /// Local edit: store, publish, re-render
    pub fn edit_day(&mut self, day: usize, edit: Override) {
        lock(&self.state).overrides.set(day, edit);
        self.publish_local();
    }

    pub fn clear_day(&mut self, day: usize) -> bool {
        let removed = lock(&self.state).overrides.clear_day(day).is_some();
        if removed {
            self.publish_local();
        }
        removed
    }

    /// Applies a remote serialized value. Returns whether local state changed.
    pub fn handle_remote(&self, remote: &str) -> bool {
        let seed = self.seed();
        match reconcile(&self.state, &self.lists, seed, remote) {
            Some(overrides) => {
                let _ = self.events.send(SessionEvent::Rendered { seed, overrides });
                true
            }
            None => false,
        }
    }

    fn publish_local(&self) {
        let serialized = self.serialized_overrides();
        if let Some(channel) = &self.channel {
            // State lock is released here; the store calls back synchronously.
            channel.publish(&serialized);
        }
        self.emit_rendered();
    }

    fn emit_rendered(&self) {
        let _ = self.events.send(SessionEvent::Rendered {
            seed: self.seed(),
            overrides: self.serialized_overrides(),
        });
    }
}

/// Remote-wins comparison. Returns the new serialized value when it replaced
/// the local map.
fn reconcile(
    state: &Mutex<PlanState>,
    lists: &MasterIndexLists,
    seed: i64,
    remote: &str,
) -> Option<String> {
    let mut state = lock(state);
    if state.seed != seed {
        return None;
    }
    let local = state.overrides.serialize(lists);
    if local == remote {
        return None;
    }
    debug!("Remote overrides for seed {} replace local '{}'", seed, local);
    state.overrides.replace_all(share::decode(remote, lists));
    Some(remote.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SideDish;
    use crate::share::OverrideMap;
    use crate::sync::realtime::MemoryRealtime;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn session(store: &Arc<dyn RealtimeStore>, viewer: &str, seed: i64) -> PlanSession {
        let menu = Arc::new(MenuConfig::builtin().unwrap());
        let lists = Arc::new(MasterIndexLists::from_menu(&menu));
        let mut session = PlanSession::new(
            menu,
            lists,
            Arc::clone(store),
            ViewerIdentity {
                viewer_id: viewer.into(),
                display_name: viewer.to_uppercase(),
                avatar_ref: String::new(),
            },
            seed,
            start(),
            PlanMode::Week,
        );
        session.join_channel();
        session
    }

    fn chapati() -> Override {
        Override {
            main_dish: "Chapati".into(),
            category: "Bread".into(),
            side_dish: SideDish::with_prep("Dal Fry", "Molaga Podi"),
        }
    }

    #[test]
    fn remote_edit_converges() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtime::new());
        let mut a = session(&store, "a", 77);
        let b = session(&store, "b", 77);

        a.edit_day(3, chapati());
        let published = a.serialized_overrides();

        let lists = MasterIndexLists::from_menu(&MenuConfig::builtin().unwrap());
        let expected = share::apply(&b.baseline(), &share::decode(&published, &lists));
        assert_eq!(b.schedule(), expected);
        assert_eq!(b.schedule()[3].main_dish, "Chapati");
        assert_eq!(b.serialized_overrides(), published);
    }

    #[test]
    fn remote_value_replaces_whole_map() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtime::new());
        let mut a = session(&store, "a", 5);
        a.edit_day(0, chapati());
        a.edit_day(1, chapati());

        assert!(a.handle_remote("4,0,0,0,-1"));
        let keys: Vec<usize> = {
            let state = lock(&a.state);
            state.overrides.map().keys().copied().collect()
        };
        assert_eq!(keys, vec![4]);
        assert!(!a.handle_remote("4,0,0,0,-1"));
    }

    #[test]
    fn late_joiner_receives_current_value() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtime::new());
        let mut a = session(&store, "a", 12);
        a.edit_day(2, chapati());
        let c = session(&store, "c", 12);
        assert_eq!(c.schedule()[2].main_dish, "Chapati");
        assert_eq!(c.viewers().len(), 2);
    }

    #[test]
    fn switching_seed_leaves_old_channel() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtime::new());
        let mut a = session(&store, "a", 1);
        let mut b = session(&store, "b", 1);
        a.edit_day(0, chapati());

        a.generate(2, start(), PlanMode::Week);
        assert_eq!(SyncState::read(store.as_ref(), 1).presence.len(), 1);
        assert_eq!(SyncState::read(store.as_ref(), 2).presence.len(), 1);
        assert_eq!(a.serialized_overrides(), "");

        b.edit_day(5, chapati());
        assert_eq!(a.serialized_overrides(), "");
        assert_eq!(a.sync_state().seed, 2);
    }

    #[test]
    fn dropping_a_session_removes_presence() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtime::new());
        let a = session(&store, "a", 9);
        {
            let _b = session(&store, "b", 9);
            assert_eq!(a.viewers().len(), 2);
        }
        assert_eq!(a.viewers().len(), 1);
    }

    #[test]
    fn share_link_opens_into_an_empty_channel() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtime::new());
        let mut a = session(&store, "a", 1);
        let mut overrides = OverrideMap::new();
        overrides.insert(1, chapati());
        let lists = MasterIndexLists::from_menu(&MenuConfig::builtin().unwrap());
        let link = ShareLink::new(31).with_overrides(share::encode(&overrides, &lists));

        a.open_link(&link, start());
        assert_eq!(a.seed(), 31);
        assert_eq!(a.schedule()[1].main_dish, "Chapati");
        assert_eq!(a.sync_state().serialized_overrides, link.overrides.unwrap());
    }

    #[test]
    fn edits_emit_render_events() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryRealtime::new());
        let mut a = session(&store, "a", 4);
        let mut events = a.events();
        a.edit_day(0, chapati());
        let mut rendered = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::Rendered { seed: 4, .. }) {
                rendered = true;
            }
        }
        assert!(rendered);
    }
}
