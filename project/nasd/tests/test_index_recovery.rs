mod common;

use std::time::Duration;

use common::{TestEnv, child_names, upload};
use nasd::service::backup::IndexOrigin;
use nasd::storage::paths::PathManager;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_fresh_start_reports_lost_index() {
    let env = TestEnv::new(2);
    let state = env.state().await;

    assert_eq!(state.origin, IndexOrigin::Empty);
    assert_eq!(env.notifier.error_subjects(), vec!["File index lost"]);
    state.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_index_is_restored_from_first_mirror() {
    let env = TestEnv::new(2);
    let paths = PathManager::new(env.data.path());

    let state = env.state().await;
    upload(&state, "alice/docs", "a.txt", b"hello").await;
    state.shutdown().await.unwrap();
    for volume in &env.volumes {
        assert!(paths.index_backup_path(volume.path()).is_file());
    }

    std::fs::remove_file(paths.index_path()).unwrap();
    let state = env.state().await;

    assert_eq!(
        state.origin,
        IndexOrigin::Restored(paths.index_backup_path(env.volume(0)))
    );
    assert_eq!(child_names(&state, "alice/docs").await, vec!["a.txt"]);
    assert!(
        env.notifier
            .successes
            .lock()
            .unwrap()
            .iter()
            .any(|message| message.contains("restored"))
    );
    state.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_truncated_index_uses_later_mirror() {
    let env = TestEnv::new(2);
    let paths = PathManager::new(env.data.path());

    let state = env.state().await;
    state.files.create_virtual_path("alice/music").await.unwrap();
    state.shutdown().await.unwrap();

    std::fs::remove_file(paths.index_backup_path(env.volume(0))).unwrap();
    std::fs::write(paths.index_path(), b"").unwrap();

    let state = env.state().await;
    assert_eq!(
        state.origin,
        IndexOrigin::Restored(paths.index_backup_path(env.volume(1)))
    );
    assert_eq!(child_names(&state, "alice").await, vec!["music"]);
    state.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupted_index_is_replaced_by_mirror() {
    let env = TestEnv::new(2);
    let paths = PathManager::new(env.data.path());

    let state = env.state().await;
    upload(&state, "alice/docs", "a.txt", b"hello").await;
    state.shutdown().await.unwrap();

    std::fs::write(paths.index_path(), b"this is not an sqlite database").unwrap();
    let state = env.state().await;

    assert_eq!(
        state.origin,
        IndexOrigin::Restored(paths.index_backup_path(env.volume(0)))
    );
    assert_eq!(child_names(&state, "alice/docs").await, vec!["a.txt"]);
    assert!(paths.index_quarantine_path().is_file());
    state.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unclean_shutdown_is_reported() {
    let env = TestEnv::new(1);

    let state = env.state().await;
    state.files.create_virtual_path("alice").await.unwrap();
    state.shutdown().await.unwrap();

    let state = env.state().await;
    assert_eq!(state.origin, IndexOrigin::Existing);
    assert!(
        !env.notifier
            .error_subjects()
            .contains(&"Unexpected shutdown".to_string())
    );
    // stop without the marker
    state.pool.close().await;

    let state = env.state().await;
    assert!(
        env.notifier
            .error_subjects()
            .contains(&"Unexpected shutdown".to_string())
    );
    state.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_background_worker_mirrors_mutations() {
    let env = TestEnv::new(2);
    let paths = PathManager::new(env.data.path());
    let state = env.state().await;
    let cancel = CancellationToken::new();
    let handles = state.spawn_background(cancel.clone());

    upload(&state, "alice", "a.txt", b"a").await;

    let mirrors: Vec<_> = env
        .volumes
        .iter()
        .map(|volume| paths.index_backup_path(volume.path()))
        .collect();
    let mut mirrored = false;
    for _ in 0..100 {
        if mirrors.iter().all(|mirror| mirror.is_file()) {
            mirrored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(mirrored, "index was never mirrored to every volume");

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
    state.shutdown().await.unwrap();
}
