// The engine is one `impl SyncEngine` split into focused parts that share this
// module scope: session/migration, remote push handling, optimistic mutations,
// and tombstones/undo.

use super::merge::{merge_remote_snapshot, rewrite_with_remote_ids, union_by_client_id};
use super::notice::{outcome, plural};
use super::{
    GraceSchedule, IdentityState, MutationKind, Notice, NoticeAction, RetryTarget, SessionPhase,
};
use crate::config::SyncConfig;
use crate::core::{ErrorKind, Result, SharedClock, SyncError};
use crate::model::{Entity, EntityFactory, EntityPayload, Tombstone};
use crate::remote::{RemoteSnapshot, RemoteStore, RemoteSubscription};
use crate::storage::{CacheScope, CollectionStore, LocalStore, StoreKeys};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

const NOTICE_CAPACITY: usize = 64;

/// A tombstone together with the cache scope it was deleted from.
#[derive(Debug, Clone)]
struct TombstoneEntry<P> {
    scope: CacheScope,
    tombstone: Tombstone<P>,
}

/// What [`EngineState::adopt_remote_id`] touched.
#[derive(Debug, Default)]
struct Adopted {
    visible: bool,
    /// Scope of a tombstone that just learned its `remote_id`; its server copy is live.
    tombstone: Option<CacheScope>,
}

impl Adopted {
    fn changed(&self) -> bool {
        self.visible || self.tombstone.is_some()
    }
}

/// Mutable engine state; only ever touched under `EngineInner::state`.
struct EngineState<P> {
    phase: SessionPhase,
    /// Bumped on every phase change so late remote completions from an older session
    /// are recognised and ignored.
    epoch: u64,
    visible: Vec<Entity<P>>,
    tombstones: Vec<TombstoneEntry<P>>,
    schedule: GraceSchedule,
    /// Last remote collection merged in, for cheap duplicate-push detection.
    last_remote: Option<Vec<Entity<P>>>,
    /// Client ids with a remote call outstanding.
    in_flight: HashMap<String, usize>,
    /// Synced entities whose latest local version the server has not confirmed.
    dirty: HashSet<String>,
    subscription: Option<JoinHandle<()>>,
}

impl<P: EntityPayload> EngineState<P> {
    fn position_of(&self, key: &str) -> Option<usize> {
        self.visible.iter().position(|entity| entity.matches_key(key))
    }

    fn live_session(&self) -> Option<(String, u64)> {
        self.phase
            .live_user()
            .map(|user_id| (user_id.to_string(), self.epoch))
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.phase.is_live()
    }

    fn begin_flight(&mut self, client_ids: impl IntoIterator<Item = String>) {
        for client_id in client_ids {
            *self.in_flight.entry(client_id).or_insert(0) += 1;
        }
    }

    fn end_flight<'a>(&mut self, client_ids: impl IntoIterator<Item = &'a String>) {
        for client_id in client_ids {
            if let Some(count) = self.in_flight.get_mut(client_id) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.in_flight.remove(client_id);
                }
            }
        }
    }

    fn suppressed_keys(&self, scope: &CacheScope) -> HashSet<String> {
        self.tombstones
            .iter()
            .filter(|entry| &entry.scope == scope)
            .map(|entry| entry.tombstone.key().to_string())
            .collect()
    }

    fn tombstones_for(&self, scope: &CacheScope) -> Vec<Tombstone<P>> {
        self.tombstones
            .iter()
            .filter(|entry| &entry.scope == scope)
            .map(|entry| entry.tombstone.clone())
            .collect()
    }

    /// Records the `remote_id` the backend assigned, on the live entity or its tombstone.
    fn adopt_remote_id(&mut self, client_id: &str, remote_id: &str) -> Adopted {
        let mut adopted = Adopted::default();
        for entity in self
            .visible
            .iter_mut()
            .filter(|entity| entity.client_id == client_id && entity.remote_id.is_none())
        {
            entity.remote_id = Some(remote_id.to_string());
            adopted.visible = true;
        }
        for entry in self.tombstones.iter_mut().filter(|entry| {
            entry.tombstone.entity.client_id == client_id
                && entry.tombstone.entity.remote_id.is_none()
        }) {
            entry.tombstone.entity.remote_id = Some(remote_id.to_string());
            adopted.tombstone = Some(entry.scope.clone());
        }
        adopted
    }

    fn is_tombstoned(&self, client_id: &str) -> bool {
        self.tombstones
            .iter()
            .any(|entry| entry.tombstone.entity.client_id == client_id)
    }

    /// Puts back the prior versions of entities a failed mutation touched, skipping any
    /// entity that changed again since (a newer intent or a remote push owns it now).
    fn revert_entities(&mut self, before: &[Entity<P>], after: &[Entity<P>]) -> usize {
        let mut reverted = 0;
        for (prior, applied) in before.iter().zip(after) {
            if let Some(position) = self
                .visible
                .iter()
                .position(|entity| entity.client_id == applied.client_id)
            {
                let current = &self.visible[position];
                if current.updated_at == applied.updated_at && current.payload == applied.payload {
                    let remote_id = current.remote_id.clone();
                    let mut restored = prior.clone();
                    restored.remote_id = restored.remote_id.or(remote_id);
                    self.visible[position] = restored;
                    reverted += 1;
                }
            }
        }
        reverted
    }
}

struct EngineInner<P: EntityPayload> {
    config: SyncConfig,
    clock: SharedClock,
    factory: EntityFactory,
    store: CollectionStore,
    remote: Arc<dyn RemoteStore<P>>,
    state: Mutex<EngineState<P>>,
    visible_tx: watch::Sender<Vec<Entity<P>>>,
    revision: std::sync::atomic::AtomicU64,
    notices: broadcast::Sender<Notice>,
}

impl<P: EntityPayload> EngineInner<P> {
    fn grace_ms(&self) -> i64 {
        self.config.grace_window_ms_i64()
    }

    /// Persists the visible collection for the current scope and publishes it if it
    /// structurally changed.
    fn commit(&self, state: &EngineState<P>) {
        self.store.save(&state.phase.scope(), &state.visible);
        self.publish(state);
    }

    fn publish(&self, state: &EngineState<P>) {
        let changed = self.visible_tx.send_if_modified(|current| {
            if *current == state.visible {
                return false;
            }
            *current = state.visible.clone();
            true
        });
        if changed {
            self.revision
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    /// Rewrites the persisted tombstone list of `scope`: in-memory entries win, entries
    /// only known from a previous page load stay until purged, `dropped` keys go.
    fn persist_tombstones(&self, state: &EngineState<P>, scope: &CacheScope, dropped: &[String]) {
        let mut persisted: Vec<Tombstone<P>> = self
            .store
            .load_tombstones::<P>(scope)
            .into_iter()
            .filter(|stale| !dropped.iter().any(|key| key == stale.key()))
            .collect();

        for tombstone in state.tombstones_for(scope) {
            match persisted.iter_mut().find(|t| t.key() == tombstone.key()) {
                Some(existing) => *existing = tombstone,
                None => persisted.push(tombstone),
            }
        }
        self.store.save_tombstones(scope, &persisted);
    }

    /// Commits what `adopted` changed. Returns the server copy still to soft-delete when a
    /// tombstone learned its id.
    fn commit_adopted(
        &self,
        state: &EngineState<P>,
        adopted: Adopted,
        client_id: &str,
        remote_id: &str,
    ) -> Option<(String, String)> {
        if adopted.visible {
            self.commit(state);
        }
        let scope = adopted.tombstone?;
        self.persist_tombstones(state, &scope, &[]);
        Some((client_id.to_string(), remote_id.to_string()))
    }

    fn notify(&self, notice: Notice) {
        // No receivers just means no UI is listening.
        let _ = self.notices.send(notice);
    }

    fn notify_failure(&self, mutation: MutationKind, count: usize, err: &SyncError) {
        let message = mutation.failure_message(P::KIND, count);
        let mut notice = Notice::failure(message, err.kind());
        if mutation == MutationKind::Create {
            notice = notice.with_action(NoticeAction::Retry(RetryTarget::PendingSync));
        }
        self.notify(notice);
    }
}

/// Local-first synchronization engine for one entity collection.
///
/// Cheap to clone; all clones drive the same state. Local effects of every operation are
/// applied under one lock before any remote call is awaited, so visible state never
/// waits on the network.
pub struct SyncEngine<P: EntityPayload> {
    inner: Arc<EngineInner<P>>,
}

impl<P: EntityPayload> Clone for SyncEngine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: EntityPayload> SyncEngine<P> {
    /// Opens the engine in the `Anonymous` phase over the anonymous cache.
    pub fn open(
        config: SyncConfig,
        local: Arc<dyn LocalStore>,
        clock: SharedClock,
        remote: Arc<dyn RemoteStore<P>>,
    ) -> Result<Self> {
        config.validate()?;
        let store = CollectionStore::new(local, StoreKeys::from_config(&config));
        let visible = store.load::<P>(&CacheScope::Anonymous);
        let (visible_tx, _) = watch::channel(visible.clone());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        event!(
            Level::DEBUG,
            app = %config.app,
            collection = %config.collection,
            loaded = visible.len(),
            "sync engine opened"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                factory: EntityFactory::new(clock.clone()),
                config,
                clock,
                store,
                remote,
                state: Mutex::new(EngineState {
                    phase: SessionPhase::Anonymous,
                    epoch: 0,
                    visible,
                    tombstones: Vec::new(),
                    schedule: GraceSchedule::new(),
                    last_remote: None,
                    in_flight: HashMap::new(),
                    dirty: HashSet::new(),
                    subscription: None,
                }),
                visible_tx,
                revision: std::sync::atomic::AtomicU64::new(0),
                notices,
            }),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase.clone()
    }

    /// Current visible collection.
    pub async fn snapshot(&self) -> Vec<Entity<P>> {
        self.inner.state.lock().await.visible.clone()
    }

    pub async fn get(&self, key: &str) -> Option<Entity<P>> {
        let state = self.inner.state.lock().await;
        state
            .position_of(key)
            .map(|position| state.visible[position].clone())
    }

    /// Feed of the visible collection; only updated on structural change.
    pub fn subscribe_visible(&self) -> watch::Receiver<Vec<Entity<P>>> {
        self.inner.visible_tx.subscribe()
    }

    /// Number of visible-collection publications so far.
    pub fn revision(&self) -> u64 {
        self.inner
            .revision
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Reads a selection pointer (e.g. the open note); dangling pointers read as `None`.
    pub async fn pointer(&self, name: &str) -> Option<Entity<P>> {
        let state = self.inner.state.lock().await;
        let target = self.inner.store.pointer(name, &state.phase.scope())?;
        state
            .position_of(&target)
            .map(|position| state.visible[position].clone())
    }

    pub async fn set_pointer(&self, name: &str, key: Option<&str>) -> Result<()> {
        let state = self.inner.state.lock().await;
        let target = match key {
            Some(key) => {
                let position = state
                    .position_of(key)
                    .ok_or_else(|| SyncError::NotFound(key.to_string()))?;
                Some(state.visible[position].client_id.clone())
            }
            None => None,
        };
        self.inner
            .store
            .set_pointer(name, &state.phase.scope(), target.as_deref());
        Ok(())
    }

    /// Earliest pending purge, if any.
    pub async fn next_purge_at(&self) -> Option<i64> {
        self.inner.state.lock().await.schedule.next_fire_at()
    }

    /// When the tombstone for `key` will be purged.
    pub async fn purge_scheduled_at(&self, key: &str) -> Option<i64> {
        let state = self.inner.state.lock().await;
        let entry = state
            .tombstones
            .iter()
            .find(|entry| entry.tombstone.entity.matches_key(key))?;
        state.schedule.fire_at(entry.tombstone.key())
    }

    /// Tombstones of the current scope still awaiting undo or purge.
    pub async fn tombstones(&self) -> Vec<Tombstone<P>> {
        let state = self.inner.state.lock().await;
        state.tombstones_for(&state.phase.scope())
    }

    /// Stops the live subscription; the engine keeps serving local state.
    pub async fn shutdown(&self) {
        let mut state = self.inner.state.lock().await;
        if let Some(handle) = state.subscription.take() {
            handle.abort();
        }
    }

    fn downgrade(&self) -> Weak<EngineInner<P>> {
        Arc::downgrade(&self.inner)
    }

    fn from_inner(inner: Arc<EngineInner<P>>) -> Self {
        Self { inner }
    }
}

include!("engine/session_and_migration.rs");
include!("engine/remote_apply.rs");
include!("engine/optimistic_mutations.rs");
include!("engine/tombstones_and_undo.rs");
