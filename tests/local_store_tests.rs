mod common;

use common::{Harness, task_titles};
use std::sync::Arc;
use tempfile::tempdir;
use tidemark::{
    AppContext, FileLocalStore, InMemoryRemoteStore, JournalNote, LocalStore, SyncConfig, Task,
};

#[test]
fn file_store_round_trips_values_under_any_key() {
    let dir = tempdir().unwrap();
    let store = FileLocalStore::open(dir.path().join("cache")).unwrap();

    store.set("tasks:items:user:a/b", "[1,2]").unwrap();
    store.set("prefs:focus_mode", "true").unwrap();
    assert_eq!(
        store.get("tasks:items:user:a/b").unwrap().as_deref(),
        Some("[1,2]")
    );
    assert_eq!(store.get("prefs:focus_mode").unwrap().as_deref(), Some("true"));

    store.set("prefs:focus_mode", "false").unwrap();
    assert_eq!(store.get("prefs:focus_mode").unwrap().as_deref(), Some("false"));

    store.remove("prefs:focus_mode").unwrap();
    store.remove("prefs:focus_mode").unwrap();
    assert_eq!(store.get("prefs:focus_mode").unwrap(), None);
}

#[tokio::test]
async fn collections_survive_a_restart_on_disk() {
    let dir = tempdir().unwrap();
    let config = SyncConfig::new("tasks", "items");

    let created = {
        let context = AppContext::on_disk(dir.path()).unwrap();
        let remote = Arc::new(InMemoryRemoteStore::<Task>::new(context.clock()));
        let engine = context.engine::<Task>(config.clone(), remote).unwrap();
        engine.create(Task::new("Buy milk")).await.unwrap();
        engine.create(Task::new("Call Sam")).await.unwrap();
        engine.snapshot().await
    };

    let context = AppContext::on_disk(dir.path()).unwrap();
    let remote = Arc::new(InMemoryRemoteStore::<Task>::new(context.clock()));
    let engine = context.engine::<Task>(config, remote).unwrap();
    assert_eq!(engine.snapshot().await, created);
}

#[tokio::test]
async fn storage_failures_never_block_mutations() {
    let h = Harness::<Task>::new("tasks", "items");
    h.local.set_fail_writes(true);

    h.engine.create(Task::new("Buy milk")).await.unwrap();
    assert_eq!(task_titles(&h.engine.snapshot().await), vec!["Buy milk"]);
    assert!(h.reload().snapshot().await.is_empty());
}

#[tokio::test]
async fn persisted_keys_follow_the_namespace() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    h.engine.create(Task::new("Call Sam")).await.unwrap();
    h.engine.delete(&task.client_id).await.unwrap();

    let stored = |key: &str| h.local.get(key).unwrap().is_some();
    assert!(stored("tasks:items:anon"));
    assert!(stored("tasks:items:tombstones:anon"));

    h.engine.sign_in("user-1").await.unwrap();
    assert!(stored("tasks:migrated:user-1"));
    assert!(stored("tasks:items:user:user-1"));
    assert!(!stored("tasks:items:anon"));
}

#[tokio::test]
async fn selection_pointer_follows_visibility() {
    let h = Harness::<JournalNote>::new("journal", "notes");
    let note = h
        .engine
        .create(JournalNote::new("Monday", "Slept well"))
        .await
        .unwrap();

    h.engine
        .set_pointer("open_note", Some(note.local_id.as_str()))
        .await
        .unwrap();
    assert_eq!(h.engine.pointer("open_note").await, Some(note.clone()));
    assert_eq!(h.reload().pointer("open_note").await, Some(note.clone()));

    h.engine.delete(&note.client_id).await.unwrap();
    assert_eq!(h.engine.pointer("open_note").await, None);

    h.engine.restore(&note.client_id).await.unwrap();
    assert_eq!(h.engine.pointer("open_note").await, Some(note));

    h.engine.set_pointer("open_note", None).await.unwrap();
    assert_eq!(h.engine.pointer("open_note").await, None);
}

#[tokio::test]
async fn pointer_to_an_unknown_entity_is_rejected() {
    let h = Harness::<JournalNote>::new("journal", "notes");
    assert!(h.engine.set_pointer("open_note", Some("nope")).await.is_err());
}

#[test]
fn focus_mode_is_shared_across_contexts_on_disk() {
    let dir = tempdir().unwrap();
    AppContext::on_disk(dir.path())
        .unwrap()
        .set_focus_mode(true);
    assert!(AppContext::on_disk(dir.path()).unwrap().focus_mode());
}
