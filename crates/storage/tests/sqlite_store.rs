use storage::{init_sqlite, KeyValueStore, SqliteStore};

#[tokio::test]
async fn memory_database_keeps_values_between_calls() {
    let store = init_sqlite("sqlite::memory:").await.expect("memory db");

    assert_eq!(store.get("RJ100").await.expect("get"), None);
    store.set("RJ100", "1320").await.expect("set");
    store.set("version", "0.2.0").await.expect("set version");
    store.set("RJ100", "990").await.expect("overwrite");

    assert_eq!(
        store.get("RJ100").await.expect("get").as_deref(),
        Some("990")
    );
    assert_eq!(
        store.list_keys().await.expect("list"),
        vec!["RJ100".to_string(), "version".to_string()]
    );
}

#[tokio::test]
async fn file_database_survives_reconnect() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("history.db");
    let url = format!(
        "sqlite://{}",
        path.to_str().expect("temp path should be utf-8")
    );

    {
        let store = SqliteStore::connect(&url).await.expect("create db");
        store
            .set("RJ200", r#"{"best":500,"best_date":1,"added_date":1}"#)
            .await
            .expect("set");
        store.pool().close().await;
    }

    let reopened = SqliteStore::connect(&url).await.expect("reopen db");
    assert_eq!(
        reopened.get("RJ200").await.expect("get").as_deref(),
        Some(r#"{"best":500,"best_date":1,"added_date":1}"#)
    );
    assert_eq!(reopened.list_keys().await.expect("list"), vec!["RJ200"]);
}
