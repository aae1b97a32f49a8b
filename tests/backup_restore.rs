use docdb::{DocDb, DocDbConfig, DocDbError, Document};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

mod common;

fn test_config(root: &std::path::Path) -> DocDbConfig {
    common::init_tracing();
    DocDbConfig::new(root.join("data"), root.join("backups"))
}

fn obj(value: serde_json::Value) -> Document {
    value.as_object().expect("object").clone()
}

fn seed(db: &DocDb) {
    db.store()
        .insert("contacts", obj(json!({"id": "c-1", "name": "Ada"})))
        .expect("contact");
    db.store()
        .insert(
            "deals",
            obj(json!({"id": "d-1", "title": "Renewal", "amount": 100})),
        )
        .expect("deal");
}

#[tokio::test]
async fn backup_then_restore_reproduces_state() {
    let dir = tempdir().expect("tempdir");
    let db = DocDb::open(test_config(dir.path())).expect("open");
    seed(&db);

    let before_contacts = db.store().get_all("contacts");
    let before_deals = db.store().get_all("deals");
    let backup = db.backups().create_backup().await.expect("backup");

    // Mutate in every way after the snapshot.
    db.store().delete("contacts", "c-1");
    db.store()
        .update("deals", "d-1", &obj(json!({"amount": 999})))
        .expect("update");
    db.store()
        .insert("tasks", obj(json!({"id": "t-1", "title": "call"})))
        .expect("task");

    db.backups()
        .restore_backup(&backup.name)
        .await
        .expect("restore");

    assert_eq!(db.store().get_all("contacts"), before_contacts);
    assert_eq!(db.store().get_all("deals"), before_deals);
    // Collections absent from the backup are kept as-is; undoing them is
    // what the safety snapshot is for.
    assert_eq!(db.store().count("tasks"), 1);
}

#[tokio::test]
async fn restore_returns_undo_point_that_restores_pre_restore_state() {
    let dir = tempdir().expect("tempdir");
    let db = DocDb::open(test_config(dir.path())).expect("open");
    seed(&db);
    let backup = db.backups().create_backup().await.expect("backup");

    // State X: diverged from the backup.
    db.store()
        .insert("contacts", obj(json!({"id": "c-2", "name": "Grace"})))
        .expect("insert");
    let state_x = db.store().get_all("contacts");

    let safety = db
        .backups()
        .restore_backup(&backup.name)
        .await
        .expect("restore");
    assert!(safety.starts_with("pre-restore_"));
    assert_eq!(db.store().count("contacts"), 1);

    // Undo: restoring the safety snapshot reproduces state X exactly.
    db.backups().restore_backup(&safety).await.expect("undo");
    assert_eq!(db.store().get_all("contacts"), state_x);
}

#[tokio::test]
async fn list_backups_is_newest_first_with_sizes() {
    let dir = tempdir().expect("tempdir");
    let db = DocDb::open(test_config(dir.path())).expect("open");
    seed(&db);

    let first = db.backups().create_backup().await.expect("backup 1");
    db.store()
        .insert("contacts", obj(json!({"name": "Grace"})))
        .expect("insert");
    let second = db.backups().create_backup().await.expect("backup 2");

    let listed = db.backups().list_backups().expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, second.name);
    assert_eq!(listed[1].name, first.name);
    assert!(listed.iter().all(|b| b.size_bytes > 0));
    assert!(listed[0].created_at >= listed[1].created_at);
}

#[tokio::test]
async fn bundle_export_contains_every_collection() {
    let dir = tempdir().expect("tempdir");
    let db = DocDb::open(test_config(dir.path())).expect("open");
    seed(&db);
    let backup = db.backups().create_backup().await.expect("backup");

    let bundle = db.backups().read_bundle(&backup.name).expect("bundle");
    assert_eq!(bundle.len(), 2);
    assert_eq!(bundle["contacts"].len(), 1);
    assert_eq!(bundle["deals"][0]["title"], json!("Renewal"));
}

#[tokio::test]
async fn restore_of_unknown_backup_is_not_found() {
    let dir = tempdir().expect("tempdir");
    let db = DocDb::open(test_config(dir.path())).expect("open");
    let err = db
        .backups()
        .restore_backup("backup_20990101T000000000000Z")
        .await
        .expect_err("missing");
    assert!(matches!(err, DocDbError::BackupNotFound { .. }));
}

#[tokio::test]
async fn restore_of_invalid_backup_aborts_before_any_mutation() {
    let dir = tempdir().expect("tempdir");
    let config = test_config(dir.path());
    let db = DocDb::open(config.clone()).expect("open");
    seed(&db);
    db.flush().await.expect("flush");

    // A backup directory whose contacts violate the schema catalog.
    let bad = config.backup_dir.join("backup_20260101T000000000000Z");
    fs::create_dir_all(&bad).expect("mkdir");
    fs::write(
        bad.join("contacts.json"),
        serde_json::to_vec(&json!([{"id": "x-1", "name": 7}])).expect("encode"),
    )
    .expect("write");

    let err = db
        .backups()
        .restore_backup("backup_20260101T000000000000Z")
        .await
        .expect_err("must reject");
    assert_eq!(err.validation_issues().len(), 1);

    // Live state and live files are untouched; no safety snapshot was taken.
    assert_eq!(db.store().count("contacts"), 1);
    assert!(db.store().get_by_id("contacts", "c-1").is_some());
    let listed = db.backups().list_backups().expect("list");
    assert!(listed.iter().all(|b| !b.name.starts_with("pre-restore_")));
}

#[tokio::test]
async fn delete_backup_reports_absence_as_false() {
    let dir = tempdir().expect("tempdir");
    let db = DocDb::open(test_config(dir.path())).expect("open");
    seed(&db);
    let backup = db.backups().create_backup().await.expect("backup");

    assert!(db.backups().delete_backup(&backup.name).expect("delete"));
    assert!(!db.backups().delete_backup(&backup.name).expect("again"));
    assert!(!db.backups().delete_backup("../etc").expect("traversal"));
    assert!(db.backups().list_backups().expect("list").is_empty());
}
