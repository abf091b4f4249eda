use super::{CacheScope, LocalStore, StoreKeys};
use crate::core::{Result, SyncError};
use crate::model::{Entity, EntityPayload, Tombstone};
use log::warn;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// Best-effort typed view over a [`LocalStore`].
///
/// Reads never fail: a missing or unparsable value reads as empty. Writes swallow and log
/// storage failures. Every save replaces the whole value.
#[derive(Clone)]
pub struct CollectionStore {
    backend: Arc<dyn LocalStore>,
    keys: StoreKeys,
}

impl CollectionStore {
    pub fn new(backend: Arc<dyn LocalStore>, keys: StoreKeys) -> Self {
        Self { backend, keys }
    }

    pub fn load<P: EntityPayload>(&self, scope: &CacheScope) -> Vec<Entity<P>> {
        read_json_or_default(self.backend.as_ref(), &self.keys.collection(scope))
    }

    pub fn save<P: EntityPayload>(&self, scope: &CacheScope, entities: &[Entity<P>]) {
        write_json_best_effort(self.backend.as_ref(), &self.keys.collection(scope), entities);
    }

    pub fn clear(&self, scope: &CacheScope) {
        remove_best_effort(self.backend.as_ref(), &self.keys.collection(scope));
    }

    pub fn load_tombstones<P: EntityPayload>(&self, scope: &CacheScope) -> Vec<Tombstone<P>> {
        read_json_or_default(self.backend.as_ref(), &self.keys.tombstones(scope))
    }

    pub fn save_tombstones<P: EntityPayload>(&self, scope: &CacheScope, tombstones: &[Tombstone<P>]) {
        let key = self.keys.tombstones(scope);
        if tombstones.is_empty() {
            remove_best_effort(self.backend.as_ref(), &key);
        } else {
            write_json_best_effort(self.backend.as_ref(), &key, tombstones);
        }
    }

    pub fn is_migrated(&self, user_id: &str) -> bool {
        read_json_or_default::<bool>(self.backend.as_ref(), &self.keys.migration_flag(user_id))
    }

    pub fn mark_migrated(&self, user_id: &str) {
        write_json_best_effort(self.backend.as_ref(), &self.keys.migration_flag(user_id), &true);
    }

    pub fn pointer(&self, name: &str, scope: &CacheScope) -> Option<String> {
        read_json_or_default(self.backend.as_ref(), &self.keys.pointer(name, scope))
    }

    pub fn set_pointer(&self, name: &str, scope: &CacheScope, value: Option<&str>) {
        let key = self.keys.pointer(name, scope);
        match value {
            Some(value) => write_json_best_effort(self.backend.as_ref(), &key, &value),
            None => remove_best_effort(self.backend.as_ref(), &key),
        }
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(backend: &dyn LocalStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = backend.get(key)? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

pub(crate) fn read_json_or_default<T: DeserializeOwned + Default>(
    backend: &dyn LocalStore,
    key: &str,
) -> T {
    match read_json(backend, key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(err) => {
            warn!("local store read of '{}' failed, using empty value: {}", key, err);
            T::default()
        }
    }
}

pub(crate) fn write_json_best_effort<T: Serialize + ?Sized>(
    backend: &dyn LocalStore,
    key: &str,
    value: &T,
) {
    let result = serde_json::to_string(value)
        .map_err(SyncError::from)
        .and_then(|raw| backend.set(key, &raw));
    if let Err(err) = result {
        warn!("local store write of '{}' failed: {}", key, err);
    }
}

pub(crate) fn remove_best_effort(backend: &dyn LocalStore, key: &str) {
    if let Err(err) = backend.remove(key) {
        warn!("local store removal of '{}' failed: {}", key, err);
    }
}
