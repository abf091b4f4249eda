// ============================================================================
// Tidemark: local-first sync engine
// ============================================================================

pub mod config;
pub mod context;
pub mod core;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;

// Re-export main types for convenience
pub use crate::config::SyncConfig;
pub use context::AppContext;
pub use crate::core::{Clock, ErrorKind, ManualClock, Result, SharedClock, SyncError, SystemClock};
pub use model::{
    Entity, EntityFactory, EntityKind, EntityPayload, JournalNote, NoteColor, StickyNote,
    SubscriptionSlot, SubscriptionSlotSet, Task, TimerSession, Tombstone,
};
pub use remote::{InMemoryRemoteStore, RemoteOp, RemoteSnapshot, RemoteStore};
pub use storage::{CacheScope, FileLocalStore, LocalStore, MemoryLocalStore};
pub use sync::{
    IdentityState, Notice, NoticeAction, NoticeLevel, PurgeWorker, RetryTarget, SessionPhase,
    SyncEngine, spawn_purge_worker,
};
