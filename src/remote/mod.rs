//! Contract the sync engine requires of the hosted backend.

use crate::core::Result;
use crate::model::{Entity, EntityPayload};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::watch;

mod memory;

pub use memory::{InMemoryRemoteStore, RemoteOp};

/// State of a live remote query.
///
/// `Loading` is distinct from `Loaded(vec![])`: an empty account must not be confused
/// with a query that has not answered yet.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSnapshot<P> {
    Loading,
    Loaded(Vec<Entity<P>>),
}

/// Push-based view of one user's remote collection.
pub type RemoteSubscription<P> = watch::Receiver<RemoteSnapshot<P>>;

/// Mapping from `client_id` to the `remote_id` the backend assigned.
pub type RemoteIdMap = HashMap<String, String>;

/// CRUD + live subscription over the hosted backend, keyed by `client_id` for idempotency
/// and by `remote_id` once an entity exists remotely.
///
/// Every call may fail with `Network`, `Unauthenticated`, `RateLimited` or `Validation`.
#[async_trait]
pub trait RemoteStore<P: EntityPayload>: Send + Sync + 'static {
    /// Opens a live query over everything `user_id` owns (soft-deleted entities excluded).
    async fn subscribe(&self, user_id: &str) -> Result<RemoteSubscription<P>>;

    /// Create-or-update matched on `client_id`.
    ///
    /// Re-sending an entity whose `updated_at` is not newer than the stored one is a no-op
    /// and never produces a second record for the same `client_id`.
    async fn upsert_by_client_id(&self, user_id: &str, entity: Entity<P>) -> Result<String>;

    async fn soft_delete(&self, user_id: &str, remote_id: &str) -> Result<()>;

    /// Undoes a soft delete; fails with `RestoreExpired` once the grace window has passed.
    async fn restore(&self, user_id: &str, remote_id: &str) -> Result<()>;

    async fn permanent_delete(&self, user_id: &str, remote_id: &str) -> Result<()>;

    /// Upserts many entities at once (first-sign-in migration).
    async fn bulk_upsert(&self, user_id: &str, entities: Vec<Entity<P>>) -> Result<RemoteIdMap>;
}
