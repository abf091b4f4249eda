mod common;

use common::{Harness, drain, eventually, task_titles};
use tidemark::{
    Clock, ErrorKind, JournalNote, NoteColor, NoticeAction, NoticeLevel, RemoteOp, RemoteSnapshot,
    RetryTarget, StickyNote, SubscriptionSlot, SubscriptionSlotSet, Task, TimerSession,
};

fn keys(entities: &[&tidemark::Entity<Task>]) -> Vec<String> {
    entities.iter().map(|entity| entity.client_id.clone()).collect()
}

#[tokio::test]
async fn anonymous_create_applies_kind_defaults() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();

    assert_eq!(task.payload.list, "inbox");
    assert_eq!(task.payload.due_date, Some(h.clock.today()));
    assert!(task.remote_id.is_none());
    assert_eq!(h.engine.snapshot().await.len(), 1);
    assert_eq!(h.engine.revision(), 1);
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_any_change() {
    let h = Harness::<Task>::new("tasks", "items");
    let err = h.engine.create(Task::new("   ")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.engine.snapshot().await.is_empty());
    assert_eq!(h.engine.revision(), 0);
}

#[tokio::test]
async fn failed_remote_create_keeps_entity_local_only() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    h.engine.create(Task::new("First")).await.unwrap();
    let mut notices = h.engine.subscribe_notices();

    h.remote.fail_next(RemoteOp::Upsert, ErrorKind::Network, 1).await;
    let err = h.engine.create(Task::new("Second")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);

    let visible = h.engine.snapshot().await;
    assert_eq!(visible.len(), 2);
    let second = visible
        .iter()
        .find(|entity| entity.payload.title == "Second")
        .unwrap();
    assert!(second.remote_id.is_none());

    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(
        notices[0].action,
        Some(NoticeAction::Retry(RetryTarget::PendingSync))
    );

    // The next successful create sweeps up the pending one.
    h.engine.create(Task::new("Third")).await.unwrap();
    assert_eq!(h.remote.live_entities("user-1").await.len(), 3);
    assert!(h.engine.snapshot().await.iter().all(|entity| entity.is_synced()));
}

#[tokio::test]
async fn failed_remote_update_reverts_to_previous_value() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    let mut notices = h.engine.subscribe_notices();

    h.remote.fail_next(RemoteOp::Upsert, ErrorKind::RateLimited, 1).await;
    let err = h
        .engine
        .update(&task.local_id, |payload| {
            payload.title = "Buy oat milk".to_string();
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimited);

    let current = h.engine.get(&task.client_id).await.unwrap();
    assert_eq!(current.payload.title, "Buy milk");
    assert_eq!(current.updated_at, task.updated_at);

    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].message, "Couldn't save task");
    assert_eq!(notices[0].error, Some(ErrorKind::RateLimited));
}

#[tokio::test]
async fn successful_update_bumps_updated_at_and_reaches_remote() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();

    let updated = h
        .engine
        .update(&task.client_id, |payload| payload.notes = "2 litres".to_string())
        .await
        .unwrap();
    assert!(updated.updated_at > task.updated_at);

    let remote = h.remote.live_entities("user-1").await;
    assert_eq!(remote[0].payload.notes, "2 litres");
}

#[tokio::test]
async fn unchanged_update_does_not_republish() {
    let h = Harness::<Task>::new("tasks", "items");
    let task = h.engine.create(Task::new("Buy milk")).await.unwrap();
    let revision = h.engine.revision();

    let same = h
        .engine
        .update(&task.client_id, |payload| payload.title = "Buy milk".to_string())
        .await
        .unwrap();
    assert_eq!(same, task);
    assert_eq!(h.engine.revision(), revision);
}

#[tokio::test]
async fn mutating_an_unknown_key_is_not_found() {
    let h = Harness::<Task>::new("tasks", "items");
    let err = h.engine.toggle("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn toggle_flips_completion_and_pin() {
    let tasks = Harness::<Task>::new("tasks", "items");
    let task = tasks.engine.create(Task::new("Buy milk")).await.unwrap();
    let toggled = tasks.engine.toggle(&task.client_id).await.unwrap();
    assert!(toggled.payload.completed);

    let journal = Harness::<JournalNote>::new("journal", "notes");
    let note = journal
        .engine
        .create(JournalNote::new("", "Slept well"))
        .await
        .unwrap();
    assert_eq!(note.payload.title, "May 10, 2024");
    let pinned = journal.engine.toggle(&note.local_id).await.unwrap();
    assert!(pinned.payload.pinned);
}

#[tokio::test]
async fn toggle_is_rejected_for_kinds_without_a_flag() {
    let h = Harness::<SubscriptionSlotSet>::new("subscriptions", "sets");
    let mut set = SubscriptionSlotSet::new("Streaming");
    set.slots.push(SubscriptionSlot {
        service: "Music".to_string(),
        monthly_cost_cents: 999,
        renews_on: None,
    });
    let set = h.engine.create(set).await.unwrap();

    let err = h.engine.toggle(&set.client_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(h.engine.get(&set.client_id).await.unwrap(), set);
}

#[tokio::test]
async fn move_to_changes_column_and_position() {
    let h = Harness::<StickyNote>::new("stickies", "notes");
    let note = h
        .engine
        .create(StickyNote::new("Ship it", NoteColor::Yellow))
        .await
        .unwrap();

    let moved = h.engine.move_to(&note.client_id, "done", 3).await.unwrap();
    assert_eq!(moved.payload.column, "done");
    assert_eq!(moved.payload.position, 3);
}

#[tokio::test]
async fn reorder_rewrites_positions_in_the_given_order() {
    let h = Harness::<Task>::new("tasks", "items");
    let a = h.engine.create(Task::new("a").at(0)).await.unwrap();
    let b = h.engine.create(Task::new("b").at(1)).await.unwrap();
    let c = h.engine.create(Task::new("c").at(2)).await.unwrap();

    let applied = h.engine.reorder("inbox", &keys(&[&c, &a, &b])).await.unwrap();
    assert!(applied);

    let visible = h.engine.snapshot().await;
    assert_eq!(task_titles(&visible), vec!["c", "a", "b"]);
    let positions: Vec<i64> = visible.iter().map(|entity| entity.payload.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[tokio::test]
async fn reorder_with_stale_membership_is_a_no_op() {
    let h = Harness::<Task>::new("tasks", "items");
    let a = h.engine.create(Task::new("a").at(0)).await.unwrap();
    let b = h.engine.create(Task::new("b").at(1)).await.unwrap();
    let c = h.engine.create(Task::new("c").at(2)).await.unwrap();
    let d = h
        .engine
        .create(Task::new("d").in_list("errands").at(0))
        .await
        .unwrap();
    let before = h.engine.snapshot().await;
    let revision = h.engine.revision();

    let moved_away = h.engine.reorder("inbox", &keys(&[&a, &b, &d])).await.unwrap();
    assert!(!moved_away);
    let duplicated = h.engine.reorder("inbox", &keys(&[&a, &a, &b])).await.unwrap();
    assert!(!duplicated);
    let missing_one = h.engine.reorder("inbox", &keys(&[&b, &a])).await.unwrap();
    assert!(!missing_one);

    assert_eq!(h.engine.snapshot().await, before);
    assert_eq!(h.engine.revision(), revision);
    let _ = c;
}

#[tokio::test]
async fn failed_remote_reorder_restores_the_previous_order() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let a = h.engine.create(Task::new("a").at(0)).await.unwrap();
    let b = h.engine.create(Task::new("b").at(1)).await.unwrap();
    let c = h.engine.create(Task::new("c").at(2)).await.unwrap();
    let mut notices = h.engine.subscribe_notices();

    h.remote.fail_next(RemoteOp::Upsert, ErrorKind::Network, 1).await;
    let err = h
        .engine
        .reorder("inbox", &keys(&[&c, &b, &a]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);

    let visible = h.engine.snapshot().await;
    assert_eq!(task_titles(&visible), vec!["a", "b", "c"]);
    let positions: Vec<i64> = visible.iter().map(|entity| entity.payload.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);

    let notices = drain(&mut notices);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].message, "Couldn't reorder 2 tasks");
}

#[tokio::test]
async fn timer_sessions_validate_duration() {
    let h = Harness::<TimerSession>::new("focus", "sessions");
    let err = h
        .engine
        .create(TimerSession::new("Deep work", 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let session = h
        .engine
        .create(TimerSession::new("Deep work", 25 * 60 * 1_000))
        .await
        .unwrap();
    let finished = h.engine.toggle(&session.client_id).await.unwrap();
    assert!(finished.payload.completed);
}

#[tokio::test]
async fn remote_push_does_not_clobber_an_in_flight_edit() {
    let h = Harness::<Task>::new("tasks", "items");
    h.engine.sign_in("user-1").await.unwrap();
    let draft = h.engine.create(Task::new("Draft")).await.unwrap();
    let confirmed = h.remote.live_entities("user-1").await;

    h.remote.pause();
    let editing = {
        let engine = h.engine.clone();
        let key = draft.client_id.clone();
        tokio::spawn(async move {
            engine
                .update(&key, |payload| payload.title = "Final".to_string())
                .await
        })
    };
    let engine = &h.engine;
    eventually(move || async move { task_titles(&engine.snapshot().await) == vec!["Final"] }).await;

    // Older server copy, then a push that no longer lists the entity.
    h.engine
        .apply_remote_snapshot(RemoteSnapshot::Loaded(confirmed))
        .await;
    h.engine
        .apply_remote_snapshot(RemoteSnapshot::Loaded(Vec::new()))
        .await;
    assert_eq!(task_titles(&h.engine.snapshot().await), vec!["Final"]);

    h.remote.resume();
    editing.await.unwrap().unwrap();
    assert_eq!(task_titles(&h.engine.snapshot().await), vec!["Final"]);
    assert_eq!(
        task_titles(&h.remote.live_entities("user-1").await),
        vec!["Final"]
    );
}
