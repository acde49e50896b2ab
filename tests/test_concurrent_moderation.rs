//! Integration tests: concurrent invocations against shared counter state
//!
//! Several invocations touching the same reviewer or the same sentiment
//! labels at once must not lose increments, and the ban flag must be set
//! by exactly one of them.

#[cfg(test)]
mod concurrent_moderation_tests {
    use reviewflow::config::BAN_THRESHOLD;
    use reviewflow::driver::ObjectRef;
    use reviewflow::store::CounterStore;
    use reviewflow::{Pipeline, PipelineConfig, SqliteCounterStore, TriggerEvent};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_no_lost_updates() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("counters.db");

        // Separate connections, like separate worker processes
        let stores: Vec<Arc<SqliteCounterStore>> = (0..4)
            .map(|_| Arc::new(SqliteCounterStore::new(&db_path).unwrap()))
            .collect();

        let mut handles = Vec::new();
        for (i, store) in stores.iter().enumerate() {
            let store = Arc::clone(store);
            handles.push(tokio::spawn(async move {
                let mut newly = 0;
                for _ in 0..25 {
                    let outcome = store
                        .increment_and_flag_above("ban_table", "SHARED", 1, BAN_THRESHOLD)
                        .await
                        .unwrap();
                    if outcome.newly_flagged {
                        newly += 1;
                    }
                    store
                        .increment("sentiment_table", if i % 2 == 0 { "positive" } else { "negative" }, 2)
                        .await
                        .unwrap();
                }
                newly
            }));
        }

        let mut newly_flagged = 0;
        for handle in handles {
            newly_flagged += handle.await.unwrap();
        }

        let row = stores[0].get("ban_table", "SHARED").await.unwrap().unwrap();
        assert_eq!(row.count, 100);
        assert!(row.flag);
        assert_eq!(newly_flagged, 1);

        let positive = stores[1].get("sentiment_table", "positive").await.unwrap().unwrap();
        let negative = stores[2].get("sentiment_table", "negative").await.unwrap().unwrap();
        assert_eq!(positive.count, 100);
        assert_eq!(negative.count, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_moderation_invocations_same_reviewer() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig {
            data_dir: dir.path().join("buckets"),
            db_path: dir.path().join("reviewflow.db"),
            ..PipelineConfig::default()
        };
        let cleaned = config.cleaned_bucket.clone();
        let pipeline = Arc::new(Pipeline::from_config(config).unwrap());

        let line = r#"{"reviewerID":"TROLL","reviewText":["total","crap"],"summary":["damn"]}"#;
        for i in 0..8 {
            pipeline
                .objects()
                .put(&cleaned, &format!("obj-{}.json", i), line.as_bytes())
                .await
                .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pipeline = Arc::clone(&pipeline);
                let event = TriggerEvent::from_objects([ObjectRef::new(cleaned.clone(), format!("obj-{}.json", i))]);
                tokio::spawn(async move { pipeline.handle(&event).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let ban = pipeline.moderation().ban_record("TROLL").await.unwrap().unwrap();
        assert_eq!(ban.profane_count, 8);
        assert!(ban.banned);

        let banned = pipeline.moderation().banned_reviewers().await.unwrap();
        assert_eq!(banned.len(), 1);
    }
}
