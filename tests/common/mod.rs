#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tidemark::{
    Entity, EntityPayload, InMemoryRemoteStore, ManualClock, MemoryLocalStore, Notice, SyncConfig,
    SyncEngine, Task,
};
use tokio::sync::broadcast;

/// 2024-05-10T12:00:00Z
pub const START_MS: i64 = 1_715_342_400_000;

pub struct Harness<P: EntityPayload> {
    pub clock: Arc<ManualClock>,
    pub local: Arc<MemoryLocalStore>,
    pub remote: InMemoryRemoteStore<P>,
    pub config: SyncConfig,
    pub engine: SyncEngine<P>,
}

impl<P: EntityPayload> Harness<P> {
    pub fn new(app: &str, collection: &str) -> Self {
        Self::with_config(SyncConfig::new(app, collection))
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let remote = InMemoryRemoteStore::new(clock.clone());
        Self::with_remote(config, clock, remote)
    }

    pub fn with_remote(
        config: SyncConfig,
        clock: Arc<ManualClock>,
        remote: InMemoryRemoteStore<P>,
    ) -> Self {
        let local = Arc::new(MemoryLocalStore::new());
        let engine = SyncEngine::<P>::open(
            config.clone(),
            local.clone(),
            clock.clone(),
            Arc::new(remote.clone()),
        )
        .unwrap();
        Self {
            clock,
            local,
            remote,
            config,
            engine,
        }
    }

    /// A fresh engine over the same local store and backend, as after a page reload.
    pub fn reload(&self) -> SyncEngine<P> {
        SyncEngine::<P>::open(
            self.config.clone(),
            self.local.clone(),
            self.clock.clone(),
            Arc::new(self.remote.clone()),
        )
        .unwrap()
    }
}

/// Polls `check` until it holds or roughly a second has passed.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

pub fn drain(notices: &mut broadcast::Receiver<Notice>) -> Vec<Notice> {
    let mut drained = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        drained.push(notice);
    }
    drained
}

pub fn task_titles(entities: &[Entity<Task>]) -> Vec<String> {
    entities
        .iter()
        .map(|entity| entity.payload.title.clone())
        .collect()
}
