use std::sync::Arc;

use mc_warden::models::backup::{BackupKind, BackupRecord, BackupStatus};
use mc_warden::persistence::backup_repo::BackupRepo;
use mc_warden::persistence::db;

async fn repo() -> BackupRepo {
    BackupRepo::new(Arc::new(db::connect_memory().await.expect("db")))
}

#[tokio::test]
async fn upsert_then_get_round_trips() {
    let repo = repo().await;
    let mut record = BackupRecord::new("nightly".into(), BackupKind::DataOnly);
    record.status = BackupStatus::Ready;
    record.size_bytes = Some(1234);

    repo.upsert(&record).await.expect("upsert");
    let loaded = repo.get_by_id(&record.id).await.expect("get").expect("row");

    assert_eq!(loaded.id, record.id);
    assert_eq!(loaded.kind, BackupKind::DataOnly);
    assert_eq!(loaded.status, BackupStatus::Ready);
    assert_eq!(loaded.size_bytes, Some(1234));
    assert_eq!(loaded.created_at.timestamp(), record.created_at.timestamp());
}

#[tokio::test]
async fn upsert_updates_outcome_fields() {
    let repo = repo().await;
    let mut record = BackupRecord::new("x".into(), BackupKind::Full);
    record.status = BackupStatus::Ready;
    repo.upsert(&record).await.expect("first");

    record.status = BackupStatus::Failed;
    record.error = Some("disk full".into());
    repo.upsert(&record).await.expect("second");

    let loaded = repo.get_by_id(&record.id).await.expect("get").expect("row");
    assert_eq!(loaded.status, BackupStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("disk full"));
    assert_eq!(repo.list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn list_is_newest_first() {
    let repo = repo().await;
    let mut older = BackupRecord::new("older".into(), BackupKind::Full);
    older.created_at -= chrono::Duration::hours(1);
    older.status = BackupStatus::Ready;
    let mut newer = BackupRecord::new("newer".into(), BackupKind::Full);
    newer.status = BackupStatus::Ready;

    repo.upsert(&older).await.expect("older");
    repo.upsert(&newer).await.expect("newer");

    let labels: Vec<String> = repo
        .list()
        .await
        .expect("list")
        .into_iter()
        .map(|r| r.label)
        .collect();
    assert_eq!(labels, vec!["newer", "older"]);
}

#[tokio::test]
async fn delete_reports_whether_a_row_existed() {
    let repo = repo().await;
    let record = BackupRecord::new("gone".into(), BackupKind::Full);
    repo.upsert(&record).await.expect("upsert");

    assert!(repo.delete(&record.id).await.expect("delete"));
    assert!(!repo.delete(&record.id).await.expect("delete again"));
    assert!(repo.get_by_id(&record.id).await.expect("get").is_none());
}
