use super::{RemoteIdMap, RemoteSnapshot, RemoteStore, RemoteSubscription};
use crate::config::DEFAULT_GRACE_WINDOW_MS;
use crate::core::{ErrorKind, Result, SharedClock, SyncError, new_remote_id};
use crate::model::{Entity, EntityPayload};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Remote operations, for fault injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Subscribe,
    Upsert,
    SoftDelete,
    Restore,
    PermanentDelete,
    BulkUpsert,
}

#[derive(Debug, Clone)]
struct RemoteDocument<P> {
    entity: Entity<P>,
    deleted_at: Option<i64>,
}

struct UserCollection<P> {
    documents: BTreeMap<String, RemoteDocument<P>>,
    feed: watch::Sender<RemoteSnapshot<P>>,
}

impl<P: EntityPayload> UserCollection<P> {
    fn new() -> Self {
        let (feed, _) = watch::channel(RemoteSnapshot::Loading);
        Self {
            documents: BTreeMap::new(),
            feed,
        }
    }

    fn live_entities(&self) -> Vec<Entity<P>> {
        let mut live: Vec<Entity<P>> = self
            .documents
            .values()
            .filter(|doc| doc.deleted_at.is_none())
            .map(|doc| doc.entity.clone())
            .collect();
        live.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.client_id.cmp(&b.client_id))
        });
        live
    }

    fn publish(&self) {
        self.feed.send_replace(RemoteSnapshot::Loaded(self.live_entities()));
    }

    fn find_by_remote_id(&mut self, remote_id: &str) -> Option<&mut RemoteDocument<P>> {
        self.documents
            .values_mut()
            .find(|doc| doc.entity.remote_id.as_deref() == Some(remote_id))
    }

    /// Last-write-wins upsert keyed by `client_id`.
    fn upsert(&mut self, mut entity: Entity<P>) -> String {
        if let Some(existing) = self.documents.get_mut(&entity.client_id) {
            let remote_id = existing
                .entity
                .remote_id
                .clone()
                .unwrap_or_else(new_remote_id);
            if entity.updated_at > existing.entity.updated_at {
                entity.remote_id = Some(remote_id.clone());
                existing.entity = entity;
            }
            return remote_id;
        }

        let remote_id = new_remote_id();
        entity.remote_id = Some(remote_id.clone());
        self.documents.insert(
            entity.client_id.clone(),
            RemoteDocument {
                entity,
                deleted_at: None,
            },
        );
        remote_id
    }
}

struct RemoteState<P> {
    users: HashMap<String, UserCollection<P>>,
    faults: HashMap<RemoteOp, VecDeque<ErrorKind>>,
    calls: HashMap<RemoteOp, usize>,
}

/// Reference backend held in memory.
///
/// Implements the full remote contract (soft delete with a restore window, idempotent
/// upserts, live feeds) and lets tests inject failures per operation and hold calls
/// in flight.
#[derive(Clone)]
pub struct InMemoryRemoteStore<P> {
    state: Arc<Mutex<RemoteState<P>>>,
    clock: SharedClock,
    grace_window_ms: i64,
    gate: Arc<watch::Sender<bool>>,
}

impl<P: EntityPayload> InMemoryRemoteStore<P> {
    pub fn new(clock: SharedClock) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(RemoteState {
                users: HashMap::new(),
                faults: HashMap::new(),
                calls: HashMap::new(),
            })),
            clock,
            grace_window_ms: DEFAULT_GRACE_WINDOW_MS as i64,
            gate: Arc::new(gate),
        }
    }

    pub fn with_grace_window_ms(mut self, grace_window_ms: i64) -> Self {
        self.grace_window_ms = grace_window_ms;
        self
    }

    /// Makes the next `times` calls of `op` fail with `kind`.
    pub async fn fail_next(&self, op: RemoteOp, kind: ErrorKind, times: usize) {
        let mut state = self.state.lock().await;
        let queue = state.faults.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(kind);
        }
    }

    /// Holds every subsequent call until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    pub async fn calls(&self, op: RemoteOp) -> usize {
        let state = self.state.lock().await;
        state.calls.get(&op).copied().unwrap_or(0)
    }

    /// Entities visible to `user_id` (soft-deleted ones excluded).
    pub async fn live_entities(&self, user_id: &str) -> Vec<Entity<P>> {
        let state = self.state.lock().await;
        state
            .users
            .get(user_id)
            .map(UserCollection::live_entities)
            .unwrap_or_default()
    }

    /// Number of stored records for `client_id`, soft-deleted included.
    pub async fn record_count(&self, user_id: &str, client_id: &str) -> usize {
        let state = self.state.lock().await;
        state
            .users
            .get(user_id)
            .map(|collection| usize::from(collection.documents.contains_key(client_id)))
            .unwrap_or(0)
    }

    pub async fn is_soft_deleted(&self, user_id: &str, remote_id: &str) -> bool {
        let mut state = self.state.lock().await;
        state
            .users
            .get_mut(user_id)
            .and_then(|collection| collection.find_by_remote_id(remote_id))
            .map(|doc| doc.deleted_at.is_some())
            .unwrap_or(false)
    }

    /// Applies a write as another device would, bypassing faults and the gate.
    pub async fn write_from_other_device(&self, user_id: &str, entity: Entity<P>) -> String {
        let mut state = self.state.lock().await;
        let collection = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(UserCollection::new);
        let remote_id = collection.upsert(entity);
        collection.publish();
        remote_id
    }

    /// Hard-deletes as another device would.
    pub async fn delete_from_other_device(&self, user_id: &str, client_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(collection) = state.users.get_mut(user_id) {
            collection.documents.remove(client_id);
            collection.publish();
        }
    }

    async fn begin(&self, op: RemoteOp) -> Result<()> {
        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this only errors if it was dropped.
        let _ = gate.wait_for(|open| *open).await;

        let mut state = self.state.lock().await;
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(kind) = state.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(SyncError::from_kind(kind, format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl<P: EntityPayload> RemoteStore<P> for InMemoryRemoteStore<P> {
    async fn subscribe(&self, user_id: &str) -> Result<RemoteSubscription<P>> {
        self.begin(RemoteOp::Subscribe).await?;
        let mut state = self.state.lock().await;
        let collection = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(UserCollection::new);
        let receiver = collection.feed.subscribe();
        collection.publish();
        Ok(receiver)
    }

    async fn upsert_by_client_id(&self, user_id: &str, entity: Entity<P>) -> Result<String> {
        self.begin(RemoteOp::Upsert).await?;
        entity.payload.validate()?;

        let mut state = self.state.lock().await;
        let collection = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(UserCollection::new);
        let remote_id = collection.upsert(entity);
        collection.publish();
        Ok(remote_id)
    }

    async fn soft_delete(&self, user_id: &str, remote_id: &str) -> Result<()> {
        self.begin(RemoteOp::SoftDelete).await?;
        let now = self.clock.now_ms();

        let mut state = self.state.lock().await;
        let collection = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| SyncError::NotFound(remote_id.to_string()))?;
        let doc = collection
            .find_by_remote_id(remote_id)
            .ok_or_else(|| SyncError::NotFound(remote_id.to_string()))?;
        if doc.deleted_at.is_none() {
            doc.deleted_at = Some(now);
        }
        collection.publish();
        Ok(())
    }

    async fn restore(&self, user_id: &str, remote_id: &str) -> Result<()> {
        self.begin(RemoteOp::Restore).await?;
        let now = self.clock.now_ms();
        let grace_window_ms = self.grace_window_ms;

        let mut state = self.state.lock().await;
        let collection = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| SyncError::RestoreExpired(remote_id.to_string()))?;
        let doc = collection
            .find_by_remote_id(remote_id)
            .ok_or_else(|| SyncError::RestoreExpired(remote_id.to_string()))?;
        match doc.deleted_at {
            None => return Ok(()),
            Some(deleted_at) if now.saturating_sub(deleted_at) >= grace_window_ms => {
                return Err(SyncError::RestoreExpired(remote_id.to_string()));
            }
            Some(_) => doc.deleted_at = None,
        }
        collection.publish();
        Ok(())
    }

    async fn permanent_delete(&self, user_id: &str, remote_id: &str) -> Result<()> {
        self.begin(RemoteOp::PermanentDelete).await?;
        let mut state = self.state.lock().await;
        if let Some(collection) = state.users.get_mut(user_id) {
            collection
                .documents
                .retain(|_, doc| doc.entity.remote_id.as_deref() != Some(remote_id));
            collection.publish();
        }
        Ok(())
    }

    async fn bulk_upsert(&self, user_id: &str, entities: Vec<Entity<P>>) -> Result<RemoteIdMap> {
        self.begin(RemoteOp::BulkUpsert).await?;
        for entity in &entities {
            entity.payload.validate()?;
        }

        let mut state = self.state.lock().await;
        let collection = state
            .users
            .entry(user_id.to_string())
            .or_insert_with(UserCollection::new);
        let mut mapping = RemoteIdMap::with_capacity(entities.len());
        for entity in entities {
            let client_id = entity.client_id.clone();
            let remote_id = collection.upsert(entity);
            mapping.insert(client_id, remote_id);
        }
        collection.publish();
        Ok(mapping)
    }
}
