use super::{Entity, EntityPayload};
use serde::{Deserialize, Serialize};

/// A deleted entity kept around for undo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone<P> {
    pub entity: Entity<P>,
    pub deleted_at: i64,
}

impl<P: EntityPayload> Tombstone<P> {
    pub fn new(entity: Entity<P>, deleted_at: i64) -> Self {
        Self { entity, deleted_at }
    }

    pub fn key(&self) -> &str {
        &self.entity.client_id
    }

    pub fn fire_at(&self, grace_window_ms: i64) -> i64 {
        self.deleted_at.saturating_add(grace_window_ms)
    }

    /// Restorable while strictly less than the grace window has elapsed.
    pub fn is_restorable_at(&self, now_ms: i64, grace_window_ms: i64) -> bool {
        now_ms.saturating_sub(self.deleted_at) < grace_window_ms
    }
}
