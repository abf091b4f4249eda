use super::{Entity, EntityPayload};
use crate::core::{SharedClock, new_client_token};

/// Mints new entities with fresh client-side identity.
#[derive(Clone)]
pub struct EntityFactory {
    clock: SharedClock,
}

impl EntityFactory {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Creates an unsynced entity: fresh `local_id` and `client_id`, both timestamps set to
    /// now, kind defaults applied.
    pub fn create<P: EntityPayload>(&self, mut payload: P) -> Entity<P> {
        let now = self.clock.now_ms();
        payload.apply_defaults(self.clock.today());
        Entity {
            local_id: new_client_token(),
            remote_id: None,
            client_id: new_client_token(),
            created_at: now,
            updated_at: now,
            payload,
        }
    }
}
