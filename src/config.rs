use crate::core::{Result, SyncError};
use std::time::Duration;

/// Default undo window after a deletion, shared by every app.
pub const DEFAULT_GRACE_WINDOW_MS: u64 = 60_000;

/// Per-engine configuration
///
/// One engine serves one (app, collection) pair, e.g. `("tasks", "items")`.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Namespace prefix for every local store key of this app
    pub app: String,

    /// Collection name inside the app namespace
    pub collection: String,

    /// How long a tombstone stays restorable
    pub grace_window_ms: u64,

    /// Interval of the background purge worker
    pub purge_tick_ms: u64,
}

impl SyncConfig {
    /// Create a configuration with default timings
    pub fn new(app: &str, collection: &str) -> Self {
        Self {
            app: app.to_string(),
            collection: collection.to_string(),
            grace_window_ms: DEFAULT_GRACE_WINDOW_MS,
            purge_tick_ms: 1_000,
        }
    }

    /// Set the undo grace window
    pub fn grace_window(mut self, window: Duration) -> Self {
        self.grace_window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the purge worker interval
    pub fn purge_tick(mut self, tick: Duration) -> Self {
        self.purge_tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn grace_window_ms_i64(&self) -> i64 {
        self.grace_window_ms.min(i64::MAX as u64) as i64
    }

    pub fn validate(&self) -> Result<()> {
        if self.app.trim().is_empty() {
            return Err(SyncError::Validation("app name must not be empty".to_string()));
        }
        if self.collection.trim().is_empty() {
            return Err(SyncError::Validation(
                "collection name must not be empty".to_string(),
            ));
        }
        if self.app.contains(':') || self.collection.contains(':') {
            return Err(SyncError::Validation(
                "app and collection names must not contain ':'".to_string(),
            ));
        }
        if self.grace_window_ms == 0 {
            return Err(SyncError::Validation(
                "grace_window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
