use super::*;
use serde_json::json;

async fn memory_store() -> Storage {
    Storage::new("sqlite::memory:", "sesotho-vocab-test")
        .await
        .expect("db")
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = memory_store().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url, "storage").await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn create_then_get_returns_payload_and_first_revision() {
    let storage = memory_store().await;
    let rev = storage
        .put("vocab", &json!({ "nouns": [] }), None)
        .await
        .expect("create");
    assert_eq!(rev.generation(), 1);

    let doc = storage.get("vocab").await.expect("get");
    assert_eq!(doc.id, "vocab");
    assert_eq!(doc.rev, rev);
    assert_eq!(doc.payload, json!({ "nouns": [] }));
}

#[tokio::test]
async fn get_missing_document_is_not_found() {
    let storage = memory_store().await;
    let err = storage.get("vocab").await.expect_err("missing");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn update_with_current_revision_advances_generation() {
    let storage = memory_store().await;
    let first = storage.put("vocab", &json!({ "n": 1 }), None).await.expect("create");
    let second = storage
        .put("vocab", &json!({ "n": 2 }), Some(&first))
        .await
        .expect("update");

    assert_eq!(second.generation(), 2);
    assert_ne!(first, second);
    assert_eq!(storage.get("vocab").await.expect("get").payload, json!({ "n": 2 }));
}

#[tokio::test]
async fn stale_revision_is_rejected_as_conflict() {
    let storage = memory_store().await;
    let first = storage.put("vocab", &json!({ "n": 1 }), None).await.expect("create");
    let second = storage
        .put("vocab", &json!({ "n": 2 }), Some(&first))
        .await
        .expect("update");

    let err = storage
        .put("vocab", &json!({ "n": 3 }), Some(&first))
        .await
        .expect_err("stale revision");
    assert!(err.is_conflict());

    let doc = storage.get("vocab").await.expect("get");
    assert_eq!(doc.rev, second);
    assert_eq!(doc.payload, json!({ "n": 2 }));
}

#[tokio::test]
async fn create_over_existing_document_is_conflict() {
    let storage = memory_store().await;
    storage.put("vocab", &json!({}), None).await.expect("create");
    let err = storage
        .put("vocab", &json!({}), None)
        .await
        .expect_err("duplicate create");
    assert!(err.is_conflict());
}

#[tokio::test]
async fn update_of_missing_document_is_not_found() {
    let storage = memory_store().await;
    let rev = Revision::new(1, "deadbeef");
    let err = storage
        .put("vocab", &json!({}), Some(&rev))
        .await
        .expect_err("missing document");
    assert!(err.is_not_found());
    assert_eq!(storage.update_seq().await.expect("seq"), 0);
}

#[tokio::test]
async fn change_log_lists_writes_after_sequence() {
    let storage = memory_store().await;
    let first = storage.put("vocab", &json!({ "n": 1 }), None).await.expect("create");
    let other = storage.put("other", &json!({}), None).await.expect("other");

    let all = storage.changes_since(0).await.expect("changes");
    assert_eq!(all.results.len(), 2);
    assert_eq!(all.last_seq, storage.update_seq().await.expect("seq"));
    assert_eq!(all.results[0].rev, first);
    assert_eq!(all.results[1].rev, other);

    let tail = storage
        .changes_since(all.results[0].seq)
        .await
        .expect("tail");
    assert_eq!(tail.results.len(), 1);
    assert_eq!(tail.results[0].id, "other");

    let empty = storage.changes_since(all.last_seq).await.expect("empty");
    assert!(empty.results.is_empty());
    assert_eq!(empty.last_seq, all.last_seq);
}

#[tokio::test]
async fn change_log_keeps_only_latest_change_per_document() {
    let storage = memory_store().await;
    let mut rev = storage.put("vocab", &json!({ "n": 0 }), None).await.expect("create");
    for n in 1..=5 {
        rev = storage
            .put("vocab", &json!({ "n": n }), Some(&rev))
            .await
            .expect("update");
    }
    storage.put("other", &json!({}), None).await.expect("other");
    let replicated = StoredDocument {
        id: "vocab".into(),
        rev: Revision::new(rev.generation() + 1, "ffff"),
        payload: json!({ "n": "remote" }),
        updated_at: Utc::now(),
    };
    assert!(storage.apply_replicated(&replicated).await.expect("apply"));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM changes")
        .fetch_one(storage.pool())
        .await
        .expect("count");
    assert_eq!(rows, 2);

    let all = storage.changes_since(0).await.expect("changes");
    let latest: Vec<(&str, &Revision)> = all
        .results
        .iter()
        .map(|c| (c.id.as_str(), &c.rev))
        .collect();
    assert_eq!(latest, [("other", &all.results[0].rev), ("vocab", &replicated.rev)]);
    assert_eq!(all.last_seq, 8);
    assert_eq!(storage.update_seq().await.expect("seq"), 8);
}

#[tokio::test]
async fn replicated_document_is_applied_only_when_newer() {
    let storage = memory_store().await;
    let local_rev = storage.put("vocab", &json!({ "n": 1 }), None).await.expect("create");

    let newer = StoredDocument {
        id: "vocab".into(),
        rev: Revision::new(local_rev.generation() + 1, "aaaa"),
        payload: json!({ "n": "remote" }),
        updated_at: Utc::now(),
    };
    assert!(storage.apply_replicated(&newer).await.expect("apply newer"));
    assert_eq!(storage.get("vocab").await.expect("get").rev, newer.rev);

    let older = StoredDocument {
        rev: Revision::new(1, "ffff"),
        payload: json!({ "n": "stale" }),
        ..newer.clone()
    };
    assert!(!storage.apply_replicated(&older).await.expect("apply older"));

    let same = newer.clone();
    assert!(!storage.apply_replicated(&same).await.expect("apply same"));

    let doc = storage.get("vocab").await.expect("get");
    assert_eq!(doc.payload, json!({ "n": "remote" }));
}

#[tokio::test]
async fn replicated_tie_on_generation_is_broken_by_digest() {
    let storage = memory_store().await;
    let low = StoredDocument {
        id: "vocab".into(),
        rev: Revision::new(2, "1111"),
        payload: json!({ "side": "low" }),
        updated_at: Utc::now(),
    };
    let high = StoredDocument {
        rev: Revision::new(2, "9999"),
        payload: json!({ "side": "high" }),
        ..low.clone()
    };

    assert!(storage.apply_replicated(&high).await.expect("high"));
    assert!(!storage.apply_replicated(&low).await.expect("low"));
    assert_eq!(
        storage.get("vocab").await.expect("get").payload,
        json!({ "side": "high" })
    );
}

#[tokio::test]
async fn watchers_are_notified_of_accepted_writes() {
    let storage = memory_store().await;
    let mut notices = storage.watch().await.expect("watch");

    let rev = storage.put("vocab", &json!({}), None).await.expect("create");
    let notice = notices.recv().await.expect("notice");
    assert_eq!(notice.db, "sesotho-vocab-test");
    assert_eq!(notice.change.id, "vocab");
    assert_eq!(notice.change.rev, rev);

    let _ = storage.put("vocab", &json!({}), None).await;
    assert!(notices.try_recv().is_err());
}

#[test]
fn next_revision_is_deterministic_for_same_history() {
    let first = next_revision(None, "{}").expect("first");
    assert_eq!(first, next_revision(None, "{}").expect("again"));
    assert_ne!(first, next_revision(None, "{\"a\":1}").expect("other body"));

    let second = next_revision(Some(&first), "{}").expect("second");
    assert_eq!(second.generation(), 2);
    assert_ne!(second.digest(), first.digest());
}

#[test]
fn next_revision_stops_at_the_last_generation() {
    let last = Revision::new(MAX_GENERATION, "abc");
    assert!(matches!(
        next_revision(Some(&last), "{}"),
        Err(StoreError::GenerationOverflow(_))
    ));
    let wrapped = Revision::new(u64::MAX, "abc");
    assert!(matches!(
        next_revision(Some(&wrapped), "{}"),
        Err(StoreError::GenerationOverflow(_))
    ));
}

#[tokio::test]
async fn document_at_last_generation_stays_readable_after_rejected_update() {
    let storage = memory_store().await;
    let last = StoredDocument {
        id: "vocab".into(),
        rev: Revision::new(MAX_GENERATION, "abc"),
        payload: json!({ "n": "last" }),
        updated_at: Utc::now(),
    };
    assert!(storage.apply_replicated(&last).await.expect("apply"));

    let err = storage
        .put("vocab", &json!({ "n": "next" }), Some(&last.rev))
        .await
        .expect_err("no successor");
    assert!(matches!(err, StoreError::GenerationOverflow(_)));

    let doc = storage.get("vocab").await.expect("still readable");
    assert_eq!(doc.rev, last.rev);
    assert_eq!(doc.payload, json!({ "n": "last" }));
}

#[tokio::test]
async fn replicated_generation_beyond_column_range_is_rejected() {
    let storage = memory_store().await;
    storage.put("vocab", &json!({}), None).await.expect("create");
    let huge = StoredDocument {
        id: "vocab".into(),
        rev: Revision::new(MAX_GENERATION + 1, "abc"),
        payload: json!({ "n": "huge" }),
        updated_at: Utc::now(),
    };

    let err = storage
        .apply_replicated(&huge)
        .await
        .expect_err("out of range");
    assert!(matches!(err, StoreError::GenerationOverflow(_)));
    assert_eq!(storage.get("vocab").await.expect("get").rev.generation(), 1);
}
