//! Backup manager end to end: background build, listing, restore, and
//! deletion against an in-memory database.

use std::sync::Arc;
use std::time::Duration;

use mc_warden::backup::BackupManager;
use mc_warden::config::BackupConfig;
use mc_warden::models::backup::{BackupKind, BackupRecord, BackupStatus};
use mc_warden::persistence::backup_repo::BackupRepo;
use mc_warden::persistence::db;
use mc_warden::AppError;

struct Fixture {
    root: tempfile::TempDir,
    _state: tempfile::TempDir,
    manager: BackupManager,
}

async fn fixture() -> Fixture {
    let root = tempfile::tempdir().expect("root");
    std::fs::create_dir_all(root.path().join("world/region")).expect("world");
    std::fs::write(root.path().join("world/level.dat"), b"level-v1").expect("level");
    std::fs::write(root.path().join("world/region/r.0.0.mca"), vec![7u8; 4096]).expect("region");
    std::fs::write(root.path().join("server.properties"), "motd=hello\n").expect("props");

    let state = tempfile::tempdir().expect("state");
    let pool = Arc::new(db::connect_memory().await.expect("db"));
    let manager = BackupManager::new(
        root.path().canonicalize().expect("canonical"),
        state.path().join("backups"),
        BackupConfig::default(),
        BackupRepo::new(pool),
    )
    .expect("manager");

    Fixture {
        root,
        _state: state,
        manager,
    }
}

/// Poll the listing until `id` leaves the `creating` state.
async fn settled(manager: &BackupManager, id: &str) -> BackupRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let record = manager
            .list_backups()
            .await
            .expect("list")
            .into_iter()
            .find(|record| record.id == id)
            .expect("record listed");
        if record.status != BackupStatus::Creating {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "backup did not settle"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn full_backup_becomes_ready() {
    let fx = fixture().await;

    let created = fx
        .manager
        .create_backup("before update", BackupKind::Full)
        .expect("create");
    assert_eq!(created.status, BackupStatus::Creating);

    let record = settled(&fx.manager, &created.id).await;

    assert_eq!(record.status, BackupStatus::Ready);
    assert_eq!(record.label, "before update");
    assert!(record.size_bytes.is_some_and(|size| size > 0));
    let archive = fx.manager.archive_path(&record.id).await.expect("archive");
    assert!(archive.starts_with(fx.manager.backup_dir()));
}

#[tokio::test]
async fn empty_label_gets_default() {
    let fx = fixture().await;

    let created = fx
        .manager
        .create_backup("   ", BackupKind::DataOnly)
        .expect("create");

    assert_eq!(created.label, "data-only backup");
    settled(&fx.manager, &created.id).await;
}

#[tokio::test]
async fn overlong_label_is_rejected() {
    let fx = fixture().await;

    let result = fx.manager.create_backup(&"x".repeat(101), BackupKind::Full);

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
}

#[tokio::test]
async fn restore_brings_back_archived_files() {
    let fx = fixture().await;
    let created = fx
        .manager
        .create_backup("snapshot", BackupKind::Full)
        .expect("create");
    settled(&fx.manager, &created.id).await;

    std::fs::write(fx.root.path().join("world/level.dat"), b"level-v2").expect("modify");
    std::fs::remove_file(fx.root.path().join("server.properties")).expect("remove");

    fx.manager.restore_backup(&created.id).await.expect("restore");

    assert_eq!(
        std::fs::read(fx.root.path().join("world/level.dat")).expect("level"),
        b"level-v1"
    );
    assert_eq!(
        std::fs::read_to_string(fx.root.path().join("server.properties")).expect("props"),
        "motd=hello\n"
    );
}

#[tokio::test]
async fn data_only_backup_archives_world_directories() {
    let fx = fixture().await;
    let created = fx
        .manager
        .create_backup("worlds", BackupKind::DataOnly)
        .expect("create");
    settled(&fx.manager, &created.id).await;

    std::fs::remove_dir_all(fx.root.path().join("world")).expect("remove world");
    std::fs::write(fx.root.path().join("server.properties"), "motd=changed\n").expect("props");

    fx.manager.restore_backup(&created.id).await.expect("restore");

    assert!(fx.root.path().join("world/region/r.0.0.mca").is_file());
    assert_eq!(
        std::fs::read_to_string(fx.root.path().join("server.properties")).expect("props"),
        "motd=changed\n"
    );
}

#[tokio::test]
async fn data_only_without_world_fails_and_is_recorded() {
    let fx = fixture().await;
    std::fs::remove_dir_all(fx.root.path().join("world")).expect("remove world");

    let created = fx
        .manager
        .create_backup("nothing", BackupKind::DataOnly)
        .expect("create");
    let record = settled(&fx.manager, &created.id).await;

    assert_eq!(record.status, BackupStatus::Failed);
    assert!(record.error.is_some());
    assert!(!fx.manager.backup_dir().join(&record.filename).exists());
    let leftovers = std::fs::read_dir(fx.manager.backup_dir()).expect("backup dir").count();
    assert_eq!(leftovers, 0, "no staging file left behind");
    assert!(matches!(
        fx.manager.restore_backup(&record.id).await,
        Err(AppError::Precondition(_))
    ));
}

#[tokio::test]
async fn delete_removes_archive_and_record() {
    let fx = fixture().await;
    let created = fx
        .manager
        .create_backup("temp", BackupKind::Full)
        .expect("create");
    let record = settled(&fx.manager, &created.id).await;
    let archive = fx.manager.backup_dir().join(&record.filename);
    assert!(archive.exists());

    fx.manager.delete_backup(&record.id).await.expect("delete");

    assert!(!archive.exists());
    assert!(fx.manager.list_backups().await.expect("list").is_empty());
    assert!(matches!(
        fx.manager.delete_backup(&record.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn missing_archive_is_reported_on_restore() {
    let fx = fixture().await;
    let created = fx
        .manager
        .create_backup("vanishing", BackupKind::Full)
        .expect("create");
    let record = settled(&fx.manager, &created.id).await;
    std::fs::remove_file(fx.manager.backup_dir().join(&record.filename)).expect("remove");

    let result = fx.manager.restore_backup(&record.id).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn malformed_ids_are_not_found() {
    let fx = fixture().await;

    for id in ["", "../../etc/passwd", "not-a-uuid"] {
        assert!(matches!(
            fx.manager.restore_backup(id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.manager.delete_backup(id).await,
            Err(AppError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn storage_usage_counts_archives() {
    let fx = fixture().await;
    let created = fx
        .manager
        .create_backup("usage", BackupKind::Full)
        .expect("create");
    let record = settled(&fx.manager, &created.id).await;

    let usage = fx.manager.storage_usage().await.expect("usage");

    assert_eq!(usage.count, 1);
    assert_eq!(Some(usage.used_bytes), record.size_bytes);
    assert_eq!(usage.quota_bytes, BackupConfig::default().quota_bytes);
}

#[tokio::test]
async fn backup_dir_inside_root_is_rejected() {
    let root = tempfile::tempdir().expect("root");
    let canonical = root.path().canonicalize().expect("canonical");
    let pool = Arc::new(db::connect_memory().await.expect("db"));

    let result = BackupManager::new(
        canonical.clone(),
        canonical.join("backups"),
        BackupConfig::default(),
        BackupRepo::new(pool),
    );

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listing_never_loses_a_backup_while_it_finishes() {
    let fx = fixture().await;

    for _ in 0..100 {
        let created = fx
            .manager
            .create_backup("", BackupKind::DataOnly)
            .expect("create");

        let mut seen = vec![BackupStatus::Creating];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let status = fx
                .manager
                .list_backups()
                .await
                .expect("list")
                .into_iter()
                .find(|record| record.id == created.id)
                .map(|record| record.status)
                .expect("backup present in every listing");
            if seen.last() != Some(&status) {
                seen.push(status);
            }
            if status != BackupStatus::Creating {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "backup did not settle");
            tokio::task::yield_now().await;
        }

        assert_eq!(seen, vec![BackupStatus::Creating, BackupStatus::Ready]);
    }
}
