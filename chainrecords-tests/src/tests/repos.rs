#[cfg(test)]
mod tests {
    use chainrecords::{get_temporary_path, AppendOutcome, JsonRepo, RecordQuery, Repo};
    use serde_json::json;

    use crate::factory::{event_record, event_record_in_transaction};
    use crate::test_runner;

    #[tokio::test]
    pub async fn appends_each_event_once() {
        let (_dir, repo) = test_runner::new_repo().await;
        let record = event_record("Staked", 151, 0);

        let first = repo.append("staking_pools", record.clone()).await.unwrap();
        let second = repo.append("staking_pools", record.clone()).await.unwrap();

        assert_eq!(first, AppendOutcome::Added);
        assert_eq!(second, AppendOutcome::AlreadyPresent);
        assert_eq!(repo.load("staking_pools").await, vec![record]);
    }

    #[tokio::test]
    pub async fn tells_apart_same_named_events_of_one_transaction() {
        let (_dir, repo) = test_runner::new_repo().await;
        let transaction_hash = "0x83d751998ff98cd609bc9b18bb36bdef8659cde2f74d6d7a1b0fef2c2bf8f839";

        let first = event_record_in_transaction(transaction_hash, "Staked", 151, 0);
        let second = event_record_in_transaction(transaction_hash, "Staked", 151, 1);
        let mut upper_cased = first.clone();
        upper_cased.transaction_hash = transaction_hash.to_uppercase().replace("0X", "0x");

        assert!(repo.append("staking_pools", first).await.unwrap().is_added());
        assert!(repo.append("staking_pools", second).await.unwrap().is_added());
        assert!(!repo.append("staking_pools", upper_cased).await.unwrap().is_added());
        assert_eq!(repo.load("staking_pools").await.len(), 2);
    }

    #[tokio::test]
    pub async fn remembers_appended_events_across_restarts() {
        let (dir, repo) = test_runner::new_repo().await;
        let record = event_record("Staked", 151, 0);
        repo.append("staking_pools", record.clone()).await.unwrap();

        let reopened = JsonRepo::open(dir.path()).await.unwrap();

        assert_eq!(
            reopened.append("staking_pools", record).await.unwrap(),
            AppendOutcome::AlreadyPresent
        );
    }

    #[tokio::test]
    pub async fn keeps_streams_ordered_by_block_and_log_index() {
        let (_dir, repo) = test_runner::new_repo().await;

        for (block_number, log_index) in [(200, 0), (151, 1), (90, 4), (151, 0), (200, 3)] {
            repo.append("staking", event_record("PoolFeeUpdated", block_number, log_index))
                .await
                .unwrap();
        }

        let positions: Vec<_> =
            repo.load("staking").await.iter().map(|record| record.get_position()).collect();
        assert_eq!(positions, vec![(90, 4), (151, 0), (151, 1), (200, 0), (200, 3)]);
    }

    #[tokio::test]
    pub async fn appends_batches_without_duplicates() {
        let (_dir, repo) = test_runner::new_repo().await;
        let existing = event_record("Staked", 10, 0);
        repo.append("staking_pools", existing.clone()).await.unwrap();

        let fresh = event_record("Withdrawn", 5, 2);
        let added = repo
            .append_batch("staking_pools", vec![existing, fresh.clone(), fresh.clone()])
            .await
            .unwrap();

        assert_eq!(added, 1);
        let records = repo.load("staking_pools").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], fresh);
    }

    #[tokio::test]
    pub async fn never_moves_checkpoints_backwards() {
        let (_dir, repo) = test_runner::new_repo().await;

        assert_eq!(repo.get_checkpoint("staking").await, None);
        assert!(repo.set_checkpoint("staking", 500).await.unwrap());
        assert!(!repo.set_checkpoint("staking", 499).await.unwrap());
        assert!(!repo.set_checkpoint("staking", 500).await.unwrap());
        assert!(repo.set_checkpoint("staking", 501).await.unwrap());

        assert_eq!(repo.get_checkpoint("staking").await, Some(501));
        assert_eq!(repo.get_checkpoint("collections").await, None);
    }

    #[tokio::test]
    pub async fn treats_unreadable_checkpoints_as_absent() {
        let (dir, repo) = test_runner::new_repo().await;
        std::fs::write(dir.path().join("checkpoints.json"), "{ not json").unwrap();

        assert_eq!(repo.get_checkpoint("staking").await, None);
        assert_eq!(repo.get_checkpoint("collections").await, None);

        let quarantined: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("checkpoints.json.corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(&quarantined[0])).unwrap(),
            "{ not json"
        );

        assert!(repo.set_checkpoint("staking", 10).await.unwrap());
        assert_eq!(repo.get_checkpoint("staking").await, Some(10));
    }

    #[tokio::test]
    pub async fn interrupted_writes_leave_streams_intact() {
        let (dir, repo) = test_runner::new_repo().await;
        let record = event_record("Staked", 151, 0);
        repo.append("staking_pools", record.clone()).await.unwrap();

        // A crash between writing the temporary file and renaming it
        let stream_path = repo.get_stream_path("staking_pools");
        let half_written = r#"[{"event_name": "Staked", "block_num"#;
        std::fs::write(get_temporary_path(&stream_path), half_written).unwrap();

        let reopened = JsonRepo::open(dir.path()).await.unwrap();

        assert_eq!(reopened.load("staking_pools").await, vec![record]);
        let stats = reopened.stats().await;
        assert_eq!(stats.streams.len(), 1);
        assert_eq!(stats.get_stream("staking_pools").unwrap().record_count, 1);
    }

    #[tokio::test]
    pub async fn quarantines_corrupted_streams() {
        let (_dir, repo) = test_runner::new_repo().await;
        let stream_path = repo.get_stream_path("collections");
        std::fs::write(&stream_path, "{ this is not a record array").unwrap();

        assert!(repo.load("collections").await.is_empty());

        let quarantined: Vec<_> = std::fs::read_dir(stream_path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("collections.json.corrupt-"))
            .collect();
        assert_eq!(quarantined.len(), 1);

        let quarantined_path = stream_path.with_file_name(&quarantined[0]);
        assert_eq!(
            std::fs::read_to_string(quarantined_path).unwrap(),
            "{ this is not a record array"
        );

        let record = event_record("CollectionCreated", 3, 0);
        assert!(repo.append("collections", record).await.unwrap().is_added());
        assert_eq!(repo.load("collections").await.len(), 1);
    }

    #[tokio::test]
    pub async fn forgets_keys_of_quarantined_streams() {
        let (_dir, repo) = test_runner::new_repo().await;
        let first = event_record("Staked", 151, 0);
        let second = event_record("Staked", 152, 0);
        repo.append("staking_pools", first.clone()).await.unwrap();

        std::fs::write(repo.get_stream_path("staking_pools"), "[{ truncated").unwrap();

        assert!(repo.append("staking_pools", second).await.unwrap().is_added());
        assert!(repo.append("staking_pools", first).await.unwrap().is_added());
        assert_eq!(repo.load("staking_pools").await.len(), 2);
    }

    #[tokio::test]
    pub async fn overwrites_projections_wholesale() {
        let (dir, repo) = test_runner::new_repo().await;
        let key = "0x00000000000000000000000000000000000000a1";

        repo.put_projection(key, json!({"total_staked": "10", "reward_rate": "1"})).await.unwrap();
        repo.put_projection(key, json!({"total_staked": "25"})).await.unwrap();
        repo.put_projection("0x02", json!({"total_staked": null})).await.unwrap();

        assert_eq!(repo.get_projection(key).await, Some(json!({"total_staked": "25"})));
        assert_eq!(repo.get_projection("0x03").await, None);

        let reopened = JsonRepo::open(dir.path()).await.unwrap();
        let projections = reopened.get_all_projections().await;
        assert_eq!(projections.len(), 2);
        assert_eq!(projections[key], json!({"total_staked": "25"}));
    }

    #[tokio::test]
    pub async fn queries_records_with_filter_offset_and_limit() {
        let (_dir, repo) = test_runner::new_repo().await;

        let mut records = vec![];
        for block_number in 1..=6 {
            let mut record = event_record("Staked", block_number, 0);
            if block_number % 2 == 0 {
                record.event_name = "Withdrawn".to_string();
            }
            records.push(record);
        }
        repo.append_batch("staking_pools", records).await.unwrap();

        let withdrawals = repo
            .get_records("staking_pools", &RecordQuery::new().with_filter("event_name", "Withdrawn"))
            .await;
        assert_eq!(
            withdrawals.iter().map(|r| r.block_number).collect::<Vec<_>>(),
            vec![2, 4, 6]
        );

        let page = repo
            .get_records(
                "staking_pools",
                &RecordQuery::new().with_filter("event_name", "Withdrawn").with_offset(1).with_limit(1),
            )
            .await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].block_number, 4);

        let by_user = repo
            .get_records(
                "staking_pools",
                &RecordQuery::new().with_filter("user", "0x7DFD6013CF8D92B751E63D481B51FE0E4C5ABF5E"),
            )
            .await;
        assert_eq!(by_user.len(), 6);
    }

    #[tokio::test]
    pub async fn reports_stream_statistics() {
        let (_dir, repo) = test_runner::new_repo().await;
        repo.append_batch(
            "staking",
            vec![event_record("PoolCreated", 1, 0), event_record("PoolFeeUpdated", 2, 0)],
        )
        .await
        .unwrap();
        repo.set_checkpoint("staking", 40).await.unwrap();
        repo.set_checkpoint("staking_pools", 40).await.unwrap();
        repo.put_projection("0x01", json!({})).await.unwrap();

        let stats = repo.stats().await;

        let staking = stats.get_stream("staking").unwrap();
        assert_eq!(staking.record_count, 2);
        assert_eq!(staking.checkpoint, Some(40));
        assert!(staking.file_size_bytes > 0);

        let pools = stats.get_stream("staking_pools").unwrap();
        assert_eq!(pools.record_count, 0);
        assert_eq!(pools.checkpoint, Some(40));

        assert_eq!(stats.projection_count, 1);
    }

    #[tokio::test]
    pub async fn rejects_stream_names_that_escape_the_store() {
        let (_dir, repo) = test_runner::new_repo().await;

        assert!(repo.append("../outside", event_record("Staked", 1, 0)).await.is_err());
        assert!(repo.load("../outside").await.is_empty());
    }
}
