mod engine;
pub mod merge;
mod notice;
mod schedule;
mod session;
mod worker;

pub use engine::SyncEngine;
pub use notice::{MutationKind, Notice, NoticeAction, NoticeLevel, RetryTarget};
pub use schedule::GraceSchedule;
pub use session::{IdentityState, SessionPhase};
pub use worker::{PurgeWorker, spawn_purge_worker};
