use crate::config::SyncConfig;
use crate::core::{Result, SharedClock, SystemClock};
use crate::model::EntityPayload;
use crate::remote::RemoteStore;
use crate::storage::collection::{read_json_or_default, write_json_best_effort};
use crate::storage::{FileLocalStore, LocalStore, MemoryLocalStore, preference_key};
use crate::sync::SyncEngine;
use std::path::PathBuf;
use std::sync::Arc;

const FOCUS_MODE: &str = "focus_mode";

/// Process-wide handles shared by every app: the local store, the clock and the small
/// preferences that live outside any entity collection.
///
/// Passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct AppContext {
    local: Arc<dyn LocalStore>,
    clock: SharedClock,
}

impl AppContext {
    pub fn new(local: Arc<dyn LocalStore>, clock: SharedClock) -> Self {
        Self { local, clock }
    }

    /// Memory-backed store and the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLocalStore::new()), Arc::new(SystemClock))
    }

    /// Directory-backed store rooted at `root`.
    pub fn on_disk(root: impl Into<PathBuf>) -> Result<Self> {
        let store = FileLocalStore::open(root)?;
        Ok(Self::new(Arc::new(store), Arc::new(SystemClock)))
    }

    pub fn local_store(&self) -> Arc<dyn LocalStore> {
        self.local.clone()
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// Opens a sync engine for one app collection over this context's store and clock.
    pub fn engine<P: EntityPayload>(
        &self,
        config: SyncConfig,
        remote: Arc<dyn RemoteStore<P>>,
    ) -> Result<SyncEngine<P>> {
        SyncEngine::open(config, self.local.clone(), self.clock.clone(), remote)
    }

    pub fn focus_mode(&self) -> bool {
        read_json_or_default(self.local.as_ref(), &preference_key(FOCUS_MODE))
    }

    pub fn set_focus_mode(&self, enabled: bool) {
        write_json_best_effort(self.local.as_ref(), &preference_key(FOCUS_MODE), &enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_mode_defaults_off_and_persists() {
        let context = AppContext::in_memory();
        assert!(!context.focus_mode());

        context.set_focus_mode(true);
        let reopened = AppContext::new(context.local_store(), context.clock());
        assert!(reopened.focus_mode());
    }
}
