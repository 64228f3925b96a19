//! Metadata store behavior: idempotent path registration and timestamp
//! updates.

use std::time::Duration;

use tempfile::TempDir;

use s3mount_daemon::Database;

/// Create a file-backed test database
async fn setup_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::connect(&temp_dir.path().join("paths.db"))
        .await
        .unwrap();
    (db, temp_dir)
}

#[tokio::test]
async fn insert_path_is_first_write_wins() {
    let (db, _temp_dir) = setup_test_db().await;

    let first = db.insert_path("a/b").await.unwrap();
    let second = db.insert_path("a/b").await.unwrap();

    // Re-insertion returns the stored timestamp unchanged.
    assert_eq!(first, second);
}

#[tokio::test]
async fn insert_distinct_paths_are_independent_records() {
    let (db, _temp_dir) = setup_test_db().await;

    db.insert_path("a").await.unwrap();
    db.insert_path("a/b").await.unwrap();
    db.insert_path("").await.unwrap();

    // All three resolve without touching each other.
    let a = db.insert_path("a").await.unwrap();
    let ab = db.insert_path("a/b").await.unwrap();
    assert_eq!(a, db.insert_path("a").await.unwrap());
    assert_eq!(ab, db.insert_path("a/b").await.unwrap());
}

#[tokio::test]
async fn update_modified_advances_timestamp() {
    let (db, _temp_dir) = setup_test_db().await;

    let created = db.insert_path("a").await.unwrap();

    // CURRENT_TIMESTAMP has one-second resolution.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    db.update_modified("a").await.unwrap();

    let after = db.insert_path("a").await.unwrap();
    assert!(after > created);
}

#[tokio::test]
async fn update_access_leaves_modified_untouched() {
    let (db, _temp_dir) = setup_test_db().await;

    let created = db.insert_path("a").await.unwrap();
    db.update_access("a").await.unwrap();

    assert_eq!(db.insert_path("a").await.unwrap(), created);
}

#[tokio::test]
async fn in_memory_database_works() {
    let db = Database::in_memory().await.unwrap();
    let first = db.insert_path("x/y").await.unwrap();
    assert_eq!(db.insert_path("x/y").await.unwrap(), first);
}

#[tokio::test]
async fn timestamps_survive_reconnect() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("paths.db");

    let db = Database::connect(&path).await.unwrap();
    let first = db.insert_path("docs").await.unwrap();
    db.close().await;

    let db = Database::connect(&path).await.unwrap();
    assert_eq!(db.insert_path("docs").await.unwrap(), first);
}
