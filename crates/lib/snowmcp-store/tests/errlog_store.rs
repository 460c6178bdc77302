use snowmcp_store::{ErrorKind, ErrorLogStore, LogEntry};

fn entry(message: &str, resolution: &str, success: bool) -> LogEntry {
    LogEntry {
        error_message: message.to_string(),
        resolution: resolution.to_string(),
        success,
        note: None,
        error_type: ErrorKind::Error,
        query: None,
    }
}

#[tokio::test]
async fn ranks_resolutions_by_success_count() {
    let dir = tempfile::tempdir().unwrap();
    let store = ErrorLogStore::open(dir.path().join("errors.json"))
        .await
        .unwrap();

    store
        .log_error(entry("Statement timed out", "raise the statement timeout", true))
        .await
        .unwrap();
    store
        .log_error(entry("Statement timed out", "resume the warehouse", true))
        .await
        .unwrap();
    store
        .log_error(entry("Statement timed out", "resume the warehouse", true))
        .await
        .unwrap();

    let best = store
        .best_resolution_for("Statement timed out")
        .await
        .unwrap();
    assert_eq!(best.text, "resume the warehouse");
    assert_eq!(best.success_count, 2);

    let all = store.resolutions_for("Statement timed out").await;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].text, "resume the warehouse");
    assert_eq!(all[1].text, "raise the statement timeout");
}

#[tokio::test]
async fn failed_attempts_collect_notes_without_raising_rank() {
    let dir = tempfile::tempdir().unwrap();
    let store = ErrorLogStore::open(dir.path().join("errors.json"))
        .await
        .unwrap();

    store
        .log_error(entry("Result set too large", "add a LIMIT clause", true))
        .await
        .unwrap();
    let mut failing = entry("Result set too large", "shrink the column list", false);
    failing.note = Some("made no difference".to_string());
    store.log_error(failing).await.unwrap();
    store
        .log_error(entry("Result set too large", "shrink the column list", false))
        .await
        .unwrap();

    let all = store.resolutions_for("Result set too large").await;
    assert_eq!(all[0].text, "add a LIMIT clause");
    assert_eq!(all[1].success_count, 0);
    assert_eq!(
        all[1].failure_notes,
        vec![
            "made no difference".to_string(),
            "No note provided.".to_string()
        ]
    );
}

#[tokio::test]
async fn survives_reload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("errors.json");
    {
        let store = ErrorLogStore::open(&path).await.unwrap();
        let mut observed = entry("Warehouse is suspended", "resume the warehouse", true);
        observed.query = Some("SELECT COUNT(*) FROM ORDERS".to_string());
        store.log_error(observed).await.unwrap();
    }

    let reopened = ErrorLogStore::open(&path).await.unwrap();
    let best = reopened
        .best_resolution_for("Warehouse is suspended")
        .await
        .unwrap();
    assert_eq!(best.text, "resume the warehouse");

    let errors = reopened.all_errors().await;
    assert_eq!(errors.len(), 1);
    let record = errors.values().next().unwrap();
    assert_eq!(record.query.as_deref(), Some("SELECT COUNT(*) FROM ORDERS"));
    assert_eq!(record.error_message, "Warehouse is suspended");
}

#[tokio::test]
async fn classification_follows_latest_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = ErrorLogStore::open(dir.path().join("errors.json"))
        .await
        .unwrap();

    let mut first = entry("Numeric value out of range", "cast to DOUBLE", true);
    first.error_type = ErrorKind::Warning;
    store.log_error(first).await.unwrap();

    let mut second = entry("Numeric value out of range", "cast to DOUBLE", true);
    second.error_type = ErrorKind::Logical;
    store.log_error(second).await.unwrap();

    assert_eq!(
        store.error_type_for("Numeric value out of range").await,
        Some(ErrorKind::Logical)
    );
}

#[tokio::test]
async fn note_failure_returns_known_fix_and_tracks_new_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = ErrorLogStore::open(dir.path().join("errors.json"))
        .await
        .unwrap();

    let hint = store
        .note_failure(None, "Unknown function FOO")
        .await
        .unwrap();
    assert!(hint.is_none());

    store
        .log_error(entry(
            "Insufficient privileges to operate on table",
            "ask an admin for USAGE on the schema",
            true,
        ))
        .await
        .unwrap();
    let hint = store
        .note_failure(
            Some("SELECT * FROM FINANCE.LEDGER"),
            "Insufficient privileges to operate on table",
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hint.text, "ask an admin for USAGE on the schema");

    let errors = store.all_errors().await;
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn volatile_details_share_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = ErrorLogStore::open(dir.path().join("errors.json"))
        .await
        .unwrap();

    store
        .log_error(entry(
            "Object 'ORDERS_2024' does not exist",
            "check the active schema",
            true,
        ))
        .await
        .unwrap();
    store
        .log_error(entry(
            "Object 'CUSTOMERS' does not exist",
            "check the active schema",
            true,
        ))
        .await
        .unwrap();

    let errors = store.all_errors().await;
    assert_eq!(errors.len(), 1);
    let record = errors.values().next().unwrap();
    assert_eq!(record.resolutions[0].success_count, 2);
    assert_eq!(record.error_message, "Object 'ORDERS_2024' does not exist");
}

#[tokio::test]
async fn corrupt_file_starts_empty_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("errors.json");
    tokio::fs::write(&path, "not json at all").await.unwrap();

    let store = ErrorLogStore::open(&path).await.unwrap();
    assert!(store.all_errors().await.is_empty());

    store
        .log_error(entry("Session no longer exists", "reconnect", true))
        .await
        .unwrap();

    let reopened = ErrorLogStore::open(&path).await.unwrap();
    assert_eq!(reopened.all_errors().await.len(), 1);
}

#[tokio::test]
async fn rejects_blank_input() {
    let dir = tempfile::tempdir().unwrap();
    let store = ErrorLogStore::open(dir.path().join("errors.json"))
        .await
        .unwrap();

    assert!(store.log_error(entry("   ", "anything", true)).await.is_err());
    assert!(store
        .log_error(entry("some failure", "  ", true))
        .await
        .is_err());
}
