mod common;

use common::{Harness, START_MS, drain, eventually, task_titles};
use std::sync::Arc;
use std::time::Duration;
use tidemark::{
    ErrorKind, InMemoryRemoteStore, ManualClock, NoticeAction, NoticeLevel, RemoteOp,
    RemoteSnapshot, SyncConfig, Task, spawn_purge_worker,
};

#[tokio::test]
async fn restore_just_inside_the_grace_window_succeeds() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();

    h.engine.delete(&task.local_id).await.unwrap();
    assert!(h.engine.snapshot().await.is_empty());

    h.clock.advance(59_999);
    assert!(h.engine.restore(&task.local_id).await.unwrap());
    assert_eq!(task_titles(&h.engine.snapshot().await), vec!["Buy milk"]);
    assert!(h.engine.tombstones().await.is_empty());
    assert_eq!(h.engine.next_purge_at().await, None);
}

#[tokio::test]
async fn restore_just_past_the_grace_window_is_a_no_op() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();

    h.engine.delete(&task.client_id).await.unwrap();
    h.clock.advance(60_001);

    assert!(!h.engine.restore(&task.client_id).await.unwrap());
    assert!(h.engine.snapshot().await.is_empty());
    assert!(h.engine.tombstones().await.is_empty());
}

#[tokio::test]
async fn delete_offers_undo_and_schedules_the_purge() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    let mut notices = h.engine.subscribe_notices();

    let tombstone = h.engine.delete(&task.client_id).await.unwrap();
    assert_eq!(tombstone.deleted_at, START_MS);
    assert_eq!(
        h.engine.purge_scheduled_at(&task.local_id).await,
        Some(START_MS + 60_000)
    );

    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert_eq!(notices[0].message, "Task deleted");
    assert_eq!(
        notices[0].action,
        Some(NoticeAction::Restore(vec![task.client_id.clone()]))
    );
}

#[tokio::test]
async fn deleting_an_unknown_key_changes_nothing() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();

    let err = h
        .engine
        .delete_many(&[task.client_id.clone(), "missing".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.engine.snapshot().await.len(), 1);
    assert!(h.engine.tombstones().await.is_empty());
}

#[tokio::test]
async fn bulk_delete_and_restore_are_single_user_actions() {
    let h = Harness::<Task>::new("tasks", "items");
    let mut keys = Vec::new();
    for title in ["a", "b", "c"] {
        keys.push(h.engine.create(Task::new(title)).await.unwrap().client_id);
    }
    let mut notices = h.engine.subscribe_notices();
    let revision = h.engine.revision();

    let tombstones = h.engine.delete_many(&keys).await.unwrap();
    assert_eq!(tombstones.len(), 3);
    assert!(h.engine.snapshot().await.is_empty());
    assert_eq!(h.engine.revision(), revision + 1);

    let deleted = drain(&mut notices);
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].message, "3 tasks deleted");
    assert_eq!(deleted[0].action, Some(NoticeAction::Restore(keys.clone())));

    h.clock.advance(1_000);
    assert_eq!(h.engine.restore_many(&keys).await.unwrap(), 3);
    assert_eq!(h.engine.revision(), revision + 2);
    let mut titles = task_titles(&h.engine.snapshot().await);
    titles.sort();
    assert_eq!(titles, vec!["a", "b", "c"]);

    let restored = drain(&mut notices);
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].message, "3 tasks restored");
}

#[tokio::test]
async fn restore_falls_back_to_persisted_tombstones_after_reload() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.create(Task::new("Keep")).await.unwrap();
    let task = h.engine.create(Task::new("Undo me")).await.unwrap();
    h.engine.delete(&task.client_id).await.unwrap();

    let reloaded = h.reload();
    assert_eq!(task_titles(&reloaded.snapshot().await), vec!["Keep"]);
    assert!(reloaded.tombstones().await.is_empty());

    h.clock.advance(30_000);
    assert!(reloaded.restore(&task.local_id).await.unwrap());
    assert_eq!(task_titles(&reloaded.snapshot().await), vec!["Keep", "Undo me"]);

    let again = h.reload();
    assert_eq!(again.snapshot().await.len(), 2);
    assert!(!again.restore(&task.local_id).await.unwrap());
}

#[tokio::test]
async fn stale_persisted_tombstone_is_discarded() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    h.engine.delete(&task.client_id).await.unwrap();

    let reloaded = h.reload();
    h.clock.advance(60_000);
    assert!(!reloaded.restore(&task.client_id).await.unwrap());
    assert!(reloaded.snapshot().await.is_empty());
    assert!(!h.reload().restore(&task.client_id).await.unwrap());
}

#[tokio::test]
async fn live_delete_soft_deletes_and_purge_permanently_deletes() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    let remote_id = task.remote_id.clone().unwrap();

    h.engine.delete(&task.client_id).await.unwrap();
    assert!(h.remote.is_soft_deleted("user-1", &remote_id).await);
    assert!(h.remote.live_entities("user-1").await.is_empty());

    h.clock.advance(59_000);
    assert_eq!(h.engine.purge_expired().await, 0);

    h.clock.advance(1_000);
    assert_eq!(h.engine.purge_expired().await, 1);
    assert_eq!(h.remote.calls(RemoteOp::PermanentDelete).await, 1);
    assert_eq!(h.remote.record_count("user-1", &task.client_id).await, 0);
    assert!(h.engine.tombstones().await.is_empty());
    assert!(!h.engine.restore(&task.client_id).await.unwrap());
}

#[tokio::test]
async fn live_restore_undoes_the_remote_soft_delete() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    let remote_id = task.remote_id.clone().unwrap();

    h.engine.delete(&task.client_id).await.unwrap();
    h.clock.advance(10_000);
    assert!(h.engine.restore(&task.client_id).await.unwrap());

    assert!(!h.remote.is_soft_deleted("user-1", &remote_id).await);
    assert_eq!(h.remote.live_entities("user-1").await.len(), 1);
    assert_eq!(task_titles(&h.engine.snapshot().await), vec!["Buy milk"]);
}

#[tokio::test]
async fn expired_remote_restore_rolls_back_the_reinsertion() {
    let clock = Arc::new(ManualClock::new(START_MS));
    let remote = InMemoryRemoteStore::new(clock.clone()).with_grace_window_ms(1_000);
    let h = Harness::<Task>::with_remote(SyncConfig::new("tasks", "items"), clock, remote);
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    h.engine.delete(&task.client_id).await.unwrap();
    let mut notices = h.engine.subscribe_notices();

    h.clock.advance(5_000);
    let err = h.engine.restore(&task.client_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RestoreExpired);
    assert!(h.engine.snapshot().await.is_empty());
    assert!(h.engine.tombstones().await.is_empty());

    let notices = drain(&mut notices);
    let failure = notices
        .iter()
        .find(|notice| notice.level == NoticeLevel::Error)
        .unwrap();
    assert_eq!(failure.message, "Couldn't restore task");
    assert_eq!(failure.error, Some(ErrorKind::RestoreExpired));
}

#[tokio::test]
async fn failed_remote_restore_keeps_the_entity_tombstoned() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    h.engine.delete(&task.client_id).await.unwrap();

    h.remote.fail_next(RemoteOp::Restore, ErrorKind::Network, 1).await;
    h.clock.advance(5_000);
    let err = h.engine.restore(&task.client_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);

    assert!(h.engine.snapshot().await.is_empty());
    let tombstones = h.engine.tombstones().await;
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].deleted_at, START_MS);
    assert_eq!(
        h.engine.purge_scheduled_at(&task.client_id).await,
        Some(START_MS + 60_000)
    );
}

#[tokio::test]
async fn failed_soft_delete_puts_the_entity_back() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();

    h.remote
        .fail_next(RemoteOp::SoftDelete, ErrorKind::Unauthenticated, 1)
        .await;
    let err = h.engine.delete(&task.client_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    assert_eq!(task_titles(&h.engine.snapshot().await), vec!["Buy milk"]);
    assert!(h.engine.tombstones().await.is_empty());
    assert_eq!(h.engine.next_purge_at().await, None);
}

#[tokio::test]
async fn purge_worker_fires_elapsed_timers() {
    let config = SyncConfig::new("tasks", "items").purge_tick(Duration::from_millis(10));
    let h = Harness::<Task>::with_config(config);
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    h.engine.delete(&task.client_id).await.unwrap();

    let worker = spawn_purge_worker(h.engine.clone());
    h.clock.advance(60_000);

    let engine = &h.engine;
    eventually(move || async move { engine.tombstones().await.is_empty() }).await;
    assert_eq!(h.engine.next_purge_at().await, None);
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn delete_during_an_in_flight_create_reaches_the_server() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();

    h.remote.pause();
    let creating = {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.create(Task::new("Buy milk")).await })
    };
    let engine = &h.engine;
    eventually(move || async move { engine.snapshot().await.len() == 1 }).await;
    let pending = h.engine.snapshot().await.remove(0);
    h.engine.delete(&pending.client_id).await.unwrap();
    assert_eq!(h.remote.calls(RemoteOp::SoftDelete).await, 0);

    h.remote.resume();
    let created = creating.await.unwrap().unwrap();
    let remote_id = created.remote_id.clone().unwrap();
    assert_eq!(h.remote.calls(RemoteOp::SoftDelete).await, 1);
    assert!(h.remote.is_soft_deleted("user-1", &remote_id).await);
    assert!(h.remote.live_entities("user-1").await.is_empty());
    assert_eq!(
        h.engine.tombstones().await[0].entity.remote_id.as_deref(),
        Some(remote_id.as_str())
    );

    let reloaded = h.reload();
    reloaded.sign_in("user-1").await.unwrap();
    reloaded
        .apply_remote_snapshot(RemoteSnapshot::Loaded(
            h.remote.live_entities("user-1").await,
        ))
        .await;
    assert!(reloaded.snapshot().await.is_empty());
}

#[tokio::test]
async fn tombstones_expiring_while_signed_out_are_purged_remotely_on_next_sign_in() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    let remote_id = task.remote_id.clone().unwrap();
    h.engine.delete(&task.client_id).await.unwrap();

    h.engine.sign_out().await;
    h.clock.advance(60_000);
    assert_eq!(h.engine.purge_expired().await, 1);
    assert_eq!(h.remote.calls(RemoteOp::PermanentDelete).await, 0);
    assert!(h.remote.is_soft_deleted("user-1", &remote_id).await);

    h.engine.sign_in("user-1").await.unwrap();
    assert_eq!(h.remote.calls(RemoteOp::PermanentDelete).await, 1);
    assert_eq!(h.remote.record_count("user-1", &task.client_id).await, 0);
    assert!(h.engine.tombstones().await.is_empty());
}
