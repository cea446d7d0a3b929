//! End-to-end scenarios: write groups flow through the capture sink into the
//! index and come back through the search protocol.

use logcar_api::{ApiError, FilePayload, RecordOptions, StoreConfig};
use logcar_chunk::ChunkError;
use logcar_rail::RailError;
use serde_json::{json, Value};

use crate::harness::{small_chunk_config, test_store};

fn no_opts() -> RecordOptions {
    RecordOptions::default()
}

#[tokio::test]
async fn create_then_read_round_trips() {
    let env = test_store(small_chunk_config());
    let created = env
        .store
        .create(json!({"hello": "world"}), &no_opts())
        .await
        .unwrap();

    let read = env.store.read(created.rid, &no_opts()).await.unwrap();
    assert_eq!(read.rid, created.rid);
    assert_eq!(read.value, json!({"hello": "world"}));
}

#[tokio::test]
async fn large_values_fan_out_and_come_back() {
    let env = test_store(small_chunk_config());
    let value = json!({
        "title": "t".repeat(50),
        "tags": ["alpha", "beta", "gamma", "delta"],
        "body": {"text": "x".repeat(100), "n": 123456789},
    });
    let created = env.store.create(value.clone(), &no_opts()).await.unwrap();
    assert!(env.index.line_count() > 5, "value should fan out");

    let read = env.store.read(created.rid, &no_opts()).await.unwrap();
    assert_eq!(read.value, value);
}

#[tokio::test]
async fn update_supersedes_create_and_reads_do_not_mask_it() {
    let env = test_store(small_chunk_config());
    let created = env
        .store
        .create(json!({"v": 1}), &no_opts())
        .await
        .unwrap();
    env.store
        .update(created.rid, json!({"v": 2}), &no_opts())
        .await
        .unwrap();

    // repeated reads emit audit lines but never change what comes back
    for _ in 0..3 {
        let read = env.store.read(created.rid, &no_opts()).await.unwrap();
        assert_eq!(read.value, json!({"v": 2}));
    }

    // every state query excludes read audit lines
    for (filter, _) in env.index.queries() {
        assert!(filter.contains("-@operation:\"read\""), "filter: {filter}");
    }
}

#[tokio::test]
async fn delete_hides_the_record() {
    let env = test_store(small_chunk_config());
    let created = env
        .store
        .create(json!({"keep": false}), &no_opts())
        .await
        .unwrap();
    env.store.read(created.rid, &no_opts()).await.unwrap();

    env.store.delete(created.rid).await.unwrap();
    assert!(matches!(
        env.store.read(created.rid, &no_opts()).await,
        Err(ApiError::NotFound(rid)) if rid == created.rid
    ));
}

#[tokio::test]
async fn encryption_round_trips_and_rejects_the_wrong_key() {
    let key = "00".repeat(32);
    let config = StoreConfig {
        encryption_enabled: true,
        encryption_key: Some(key.clone()),
        deployment_id: Some("dep-test".to_string()),
        ..StoreConfig::default()
    };
    let env = test_store(config);
    let created = env.store.create(json!([1, 2, 3]), &no_opts()).await.unwrap();

    // emitted data fragments are salt:iv:ciphertext hex blobs
    let lines = env.index.lines();
    assert!(!lines.is_empty());
    for line in &lines {
        assert_eq!(line.line.get("encrypted"), Some(&json!(true)));
        let blob = line.line.get("data").and_then(Value::as_str).unwrap();
        let parts: Vec<&str> = blob.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_hexdigit())));
    }

    let read = env.store.read(created.rid, &no_opts()).await.unwrap();
    assert_eq!(read.value, json!([1, 2, 3]));

    let wrong = RecordOptions {
        key: Some("ff".repeat(32)),
    };
    assert!(matches!(
        env.store.read(created.rid, &wrong).await,
        Err(ApiError::Rail(RailError::Chunk(ChunkError::Decryption(_))))
    ));
}

#[tokio::test]
async fn repair_pass_completes_a_short_primary_fetch() {
    let config = StoreConfig {
        max_chunk_length: 4,
        deployment_id: Some("dep-test".to_string()),
        ..StoreConfig::default()
    };
    let env = test_store(config);
    let value = json!("abcdefghijklmnopqrst");
    let created = env.store.create(value.clone(), &no_opts()).await.unwrap();
    assert_eq!(env.index.line_count(), 5);

    // the index pretends it has only seen 3 of the 5 fragments
    env.index.truncate_next_fetch(3);
    let read = env.store.read(created.rid, &no_opts()).await.unwrap();
    assert_eq!(read.value, value);

    let queries = env.index.queries();
    assert_eq!(queries.len(), 2, "primary fetch plus one repair query");
    assert_eq!(
        queries[1].0,
        format!("@__id:\"{}\" AND @operation:\"create\"", created.rid)
    );
    assert_eq!(queries[1].1, 10);
}

#[tokio::test]
async fn file_payloads_round_trip() {
    let env = test_store(small_chunk_config());
    let payload = FilePayload {
        name: "notes.txt".to_string(),
        content_type: "text/plain".to_string(),
        data: b"line one\nline two\n".to_vec(),
    };
    let created = env
        .store
        .create(payload.to_envelope(), &no_opts())
        .await
        .unwrap();

    let read = env.store.read(created.rid, &no_opts()).await.unwrap();
    assert_eq!(FilePayload::from_envelope(&read.value).unwrap(), payload);
}

#[tokio::test]
async fn concurrent_writes_keep_their_groups_contiguous() {
    let env = test_store(small_chunk_config());
    let a = json!({"name": "a".repeat(40)});
    let b = json!({"name": "b".repeat(40)});

    let opts_a = no_opts();
    let opts_b = no_opts();
    let (ra, rb) = tokio::join!(
        env.store.create(a.clone(), &opts_a),
        env.store.create(b.clone(), &opts_b),
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    // each group occupies one contiguous run of the output stream
    let rids: Vec<String> = env
        .index
        .lines()
        .iter()
        .map(|l| l.line["__id"].as_str().unwrap().to_string())
        .collect();
    let boundaries = rids.windows(2).filter(|w| w[0] != w[1]).count();
    assert_eq!(boundaries, 1, "line order: {rids:?}");

    assert_eq!(env.store.read(ra.rid, &no_opts()).await.unwrap().value, a);
    assert_eq!(env.store.read(rb.rid, &no_opts()).await.unwrap().value, b);
}
