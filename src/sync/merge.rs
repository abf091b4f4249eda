//! Last-write-wins reconciliation between local and remote representations.
//!
//! Everything here is keyed by `client_id`. LWW is entity-grained: the representation
//! with the strictly greater `updated_at` replaces the other wholesale, ties keep the one
//! already applied.

use crate::model::{Entity, EntityPayload};
use crate::remote::RemoteIdMap;
use std::collections::{HashMap, HashSet};

/// Applies `incoming` over `existing` if it is strictly newer.
///
/// The local `local_id` survives a replacement so UI keys stay stable. A `remote_id`
/// learned from `incoming` is adopted even when its payload loses.
/// Returns `true` when `existing` changed.
pub fn apply_lww<P: EntityPayload>(existing: &mut Entity<P>, incoming: &Entity<P>) -> bool {
    if incoming.supersedes(existing) {
        let local_id = std::mem::take(&mut existing.local_id);
        let remote_id = incoming.remote_id.clone().or_else(|| existing.remote_id.take());
        *existing = incoming.clone();
        existing.local_id = local_id;
        existing.remote_id = remote_id;
        return true;
    }

    if existing.remote_id.is_none() && incoming.remote_id.is_some() {
        existing.remote_id = incoming.remote_id.clone();
        return true;
    }
    false
}

/// Merges a pushed remote collection into the visible one.
///
/// - known entities follow [`apply_lww`];
/// - unknown remote entities are appended unless `suppressed` (tombstoned here);
/// - visible entities missing remotely are kept when unsynced or `in_flight`, and dropped
///   otherwise (deleted elsewhere).
pub fn merge_remote_snapshot<P: EntityPayload>(
    visible: &[Entity<P>],
    remote: &[Entity<P>],
    suppressed: &HashSet<String>,
    in_flight: &HashSet<String>,
) -> Vec<Entity<P>> {
    let remote_by_client: HashMap<&str, &Entity<P>> = remote
        .iter()
        .map(|entity| (entity.client_id.as_str(), entity))
        .collect();

    let mut merged = Vec::with_capacity(visible.len().max(remote.len()));
    let mut seen = HashSet::with_capacity(visible.len());

    for local in visible {
        seen.insert(local.client_id.as_str());
        match remote_by_client.get(local.client_id.as_str()) {
            Some(incoming) => {
                let mut entity = local.clone();
                apply_lww(&mut entity, incoming);
                merged.push(entity);
            }
            None if !local.is_synced() || in_flight.contains(&local.client_id) => {
                merged.push(local.clone());
            }
            None => {}
        }
    }

    for incoming in remote {
        if seen.contains(incoming.client_id.as_str()) || suppressed.contains(&incoming.client_id)
        {
            continue;
        }
        let mut entity = incoming.clone();
        if let Some(remote_id) = &entity.remote_id {
            entity.local_id = remote_id.clone();
        }
        merged.push(entity);
    }

    merged
}

/// Rewrites migrated entities in place: `local_id` becomes the assigned `remote_id`,
/// `client_id` is kept. Entities absent from `mapping` are returned untouched.
pub fn rewrite_with_remote_ids<P: EntityPayload>(
    entities: Vec<Entity<P>>,
    mapping: &RemoteIdMap,
) -> Vec<Entity<P>> {
    entities
        .into_iter()
        .map(|mut entity| {
            if let Some(remote_id) = mapping.get(&entity.client_id) {
                entity.local_id = remote_id.clone();
                entity.remote_id = Some(remote_id.clone());
            }
            entity
        })
        .collect()
}

/// Union of two collections by `client_id`, resolving overlaps with [`apply_lww`].
/// Order: `base` first, then entities only present in `extra`.
pub fn union_by_client_id<P: EntityPayload>(
    base: Vec<Entity<P>>,
    extra: Vec<Entity<P>>,
) -> Vec<Entity<P>> {
    let mut merged = base;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(position, entity)| (entity.client_id.clone(), position))
        .collect();

    for entity in extra {
        match index.get(&entity.client_id) {
            Some(&position) => {
                apply_lww(&mut merged[position], &entity);
            }
            None => {
                index.insert(entity.client_id.clone(), merged.len());
                merged.push(entity);
            }
        }
    }
    merged
}
