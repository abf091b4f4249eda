use crate::core::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// The five entity shapes served by the apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    JournalNote,
    StickyNote,
    TimerSession,
    SubscriptionSlotSet,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::JournalNote => "note",
            Self::StickyNote => "sticky note",
            Self::TimerSession => "timer session",
            Self::SubscriptionSlotSet => "subscription set",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind-specific fields of an entity.
///
/// The engine only relies on the hooks below; everything else about a payload is opaque
/// and compared structurally. Ordering hooks default to "not orderable".
pub trait EntityPayload:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityKind;

    /// Fills defaults that depend on the creation instant (e.g. due date = today).
    fn apply_defaults(&mut self, _today: NaiveDate) {}

    /// Client-side check run before any state change; failures are `Validation` errors.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Ordering group the entity belongs to (a task list, a board column).
    fn group(&self) -> &str {
        ""
    }

    /// Moves the entity to another group. Returns `false` if the kind has no groups.
    fn set_group(&mut self, _group: &str) -> bool {
        false
    }

    fn position(&self) -> Option<i64> {
        None
    }

    /// Returns `false` if the kind is not orderable.
    fn set_position(&mut self, _position: i64) -> bool {
        false
    }

    /// Flips the kind's boolean state (completion, pin). Returns `false` if unsupported.
    fn toggle(&mut self) -> bool {
        false
    }
}

/// A client-held entity with its sync identity.
///
/// `client_id` is the merge key against the remote store and never changes;
/// `local_id` is the UI key on this device; `remote_id` appears once the remote store
/// accepted the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity<P> {
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub client_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(flatten)]
    pub payload: P,
}

impl<P: EntityPayload> Entity<P> {
    pub fn is_synced(&self) -> bool {
        self.remote_id.is_some()
    }

    /// True when `key` names this entity by local, client or remote id.
    pub fn matches_key(&self, key: &str) -> bool {
        self.local_id == key || self.client_id == key || self.remote_id.as_deref() == Some(key)
    }

    /// Re-stamps `updated_at`, keeping it strictly increasing even under a coarse clock.
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = now_ms.max(self.updated_at.saturating_add(1));
    }

    /// True when `self` should replace `existing` under last-write-wins.
    pub fn supersedes(&self, existing: &Entity<P>) -> bool {
        self.updated_at > existing.updated_at
    }
}
