use std::collections::HashMap;

/// Pending permanent removals, keyed by entity `client_id`.
///
/// Each deletion owns one `{key, fire_at}` entry; restore cancels it by key from any call
/// site. Cancelling an absent entry is a no-op.
#[derive(Debug, Clone, Default)]
pub struct GraceSchedule {
    entries: HashMap<String, i64>,
}

impl GraceSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules (or reschedules) `key` to fire at `fire_at_ms`.
    pub fn schedule(&mut self, key: impl Into<String>, fire_at_ms: i64) {
        self.entries.insert(key.into(), fire_at_ms);
    }

    /// Returns `true` if an entry was pending.
    pub fn cancel(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn fire_at(&self, key: &str) -> Option<i64> {
        self.entries.get(key).copied()
    }

    pub fn next_fire_at(&self) -> Option<i64> {
        self.entries.values().copied().min()
    }

    /// Removes and returns every key whose time has come, earliest first.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<String> {
        let mut due: Vec<(i64, String)> = self
            .entries
            .iter()
            .filter(|(_, fire_at)| **fire_at <= now_ms)
            .map(|(key, fire_at)| (*fire_at, key.clone()))
            .collect();
        due.sort();
        for (_, key) in &due {
            self.entries.remove(key);
        }
        due.into_iter().map(|(_, key)| key).collect()
    }
}
