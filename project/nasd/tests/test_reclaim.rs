mod common;

use chrono::{Duration, Utc};
use common::{TestEnv, child_names, files_on_disk, upload};
use nasd::domain::session::Session;
use nasd::service::scheduler::{Sweep, run_sweep};

#[tokio::test]
async fn test_expired_trash_is_purged_once() {
    let mut env = TestEnv::new(1);
    env.config.trash_can.retention_days = 0;
    let state = env.state().await;
    upload(&state, "alice/photos", "a.jpg", b"a").await;
    upload(&state, "alice", "keep.txt", b"k").await;
    state.files.delete("alice/photos").await.unwrap();

    let now = Utc::now() + Duration::seconds(1);
    let report = state.reclaimer.expire_trash(now).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.removed, 2);
    assert!(child_names(&state, "alice/trash").await.is_empty());
    assert_eq!(files_on_disk(env.volume(0)).len(), 1);

    let again = state.reclaimer.expire_trash(now).await.unwrap();
    assert_eq!(again.removed, 0);
}

#[tokio::test]
async fn test_recent_trash_is_kept() {
    let env = TestEnv::new(1);
    let state = env.state().await;
    upload(&state, "alice", "a.txt", b"a").await;
    let trashed = state.files.delete("alice/a.txt").await.unwrap().node.unwrap();

    let report = state.reclaimer.expire_trash(Utc::now()).await.unwrap();
    assert_eq!(report.removed, 0);
    assert!(state.index.find_by_path(&trashed.logical_path).await.unwrap().is_some());

    let later = Utc::now() + Duration::days(31);
    let report = state.reclaimer.expire_trash(later).await.unwrap();
    assert_eq!(report.removed, 1);
}

#[tokio::test]
async fn test_trash_expiry_ignores_nested_trash_folders() {
    let mut env = TestEnv::new(1);
    env.config.trash_can.retention_days = 0;
    let state = env.state().await;
    upload(&state, "alice/docs/trash", "notes.txt", b"n").await;

    let report = state
        .reclaimer
        .expire_trash(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(report.removed, 0);
    assert!(
        state
            .index
            .find_by_path("alice/docs/trash/notes.txt")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_trash_expiry_disabled_without_trash() {
    let mut env = TestEnv::new(1);
    env.config.trash_can.enabled = false;
    env.config.trash_can.retention_days = 0;
    let state = env.state().await;
    state.files.create_virtual_path("alice/trash/old").await.unwrap();

    let report = state
        .reclaimer
        .expire_trash(Utc::now() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(report.removed, 0);
    assert!(state.index.find_by_path("alice/trash/old").await.unwrap().is_some());
}

#[tokio::test]
async fn test_orphans_outside_trash_are_removed() {
    let env = TestEnv::new(1);
    let state = env.state().await;
    let gone = upload(&state, "alice", "gone.txt", b"g").await.node.unwrap();
    upload(&state, "alice", "kept.txt", b"k").await;
    let trashed = upload(&state, "alice", "trashed.txt", b"t").await.node.unwrap();
    let trashed_root = state.files.delete("alice/trashed.txt").await.unwrap().node.unwrap();

    std::fs::remove_file(&gone.physical_path).unwrap();
    std::fs::remove_file(&trashed.physical_path).unwrap();

    let report = state.reclaimer.repair_orphans().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(child_names(&state, "alice").await, vec!["trash", "kept.txt"]);
    // the trash is left to trash expiry
    assert!(
        state
            .index
            .find_by_path(&trashed_root.logical_path)
            .await
            .unwrap()
            .is_some()
    );

    let again = state.reclaimer.repair_orphans().await.unwrap();
    assert_eq!(again.removed, 0);
}

#[tokio::test]
async fn test_expired_sessions_are_removed() {
    let env = TestEnv::new(1);
    let state = env.state().await;
    let stale = Session::new("alice", Duration::hours(-1));
    let fresh = Session::new("alice", Duration::hours(1));
    state.sessions.create(&stale).await.unwrap();
    state.sessions.create(&fresh).await.unwrap();

    let report = state.reclaimer.expire_sessions(Utc::now()).await.unwrap();
    assert_eq!(report.removed, 1);
    assert!(state.sessions.find(&stale.token).await.unwrap().is_none());
    assert_eq!(
        state.sessions.find(&fresh.token).await.unwrap().map(|s| s.username),
        Some("alice".to_string())
    );
}

#[tokio::test]
async fn test_sweep_results_reach_the_operator() {
    let mut env = TestEnv::new(1);
    env.config.trash_can.retention_days = 0;
    let state = env.state().await;
    let node = upload(&state, "alice", "gone.txt", b"g").await.node.unwrap();
    std::fs::remove_file(&node.physical_path).unwrap();
    // a fresh data dir already raised the lost index alert
    env.notifier.errors.lock().unwrap().clear();

    for sweep in Sweep::ALL {
        let report = run_sweep(&state.reclaimer, state.notifier.as_ref(), sweep).await;
        assert!(report.is_some());
    }
    let successes = env.notifier.successes.lock().unwrap().clone();
    assert_eq!(successes, vec!["orphan repair removed 1 item(s)".to_string()]);
    assert!(env.notifier.error_subjects().is_empty());
}
