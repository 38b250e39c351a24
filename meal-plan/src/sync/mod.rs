pub mod realtime;
pub mod channel;
pub mod presence;
pub mod session;

pub use realtime::{MemoryRealtime, PresenceRecord, RealtimeStore, ViewerId};
pub use channel::{SyncChannel, SyncState};
pub use presence::{PresenceTracker, ViewerPresence};
pub use session::{PlanSession, SessionEvent, ViewerIdentity};
