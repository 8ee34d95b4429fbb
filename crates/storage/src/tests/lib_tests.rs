use super::*;

#[tokio::test]
async fn stores_and_reads_values() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.get("clinic_auth_token").await.expect("get"), None);

    storage.put("clinic_auth_token", "abc").await.expect("put");
    assert_eq!(
        storage.get("clinic_auth_token").await.expect("get").as_deref(),
        Some("abc")
    );

    storage.put("clinic_auth_token", "def").await.expect("overwrite");
    assert_eq!(
        storage.get("clinic_auth_token").await.expect("get").as_deref(),
        Some("def")
    );
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn remove_reports_whether_key_existed() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.put("k", "v").await.expect("put");
    assert!(storage.remove("k").await.expect("remove"));
    assert!(!storage.remove("k").await.expect("remove again"));
}

#[tokio::test]
async fn batch_write_and_delete_touch_every_key() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .put_many(&[("a", "1"), ("b", "2")])
        .await
        .expect("put many");
    assert_eq!(storage.get("b").await.expect("get").as_deref(), Some("2"));

    storage.remove_many(&["a", "b"]).await.expect("remove many");
    assert_eq!(storage.get("a").await.expect("get"), None);
    assert_eq!(storage.get("b").await.expect("get"), None);
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("session.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    storage.put("k", "v").await.expect("put");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(reopened.get("k").await.expect("get").as_deref(), Some("v"));
}

#[test]
fn sqlite_path_ignores_memory_urls() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/session.db?mode=rwc"),
        Some(PathBuf::from("./data/session.db"))
    );
}
