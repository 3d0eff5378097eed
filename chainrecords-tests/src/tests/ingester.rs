#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chainrecords::connection::ConnectionError;
    use chainrecords::ingester::{BlockRange, CycleReport};
    use chainrecords::{ChainRecordsError, ContractConfig, IndexerState, Repo};
    use ethers::abi::Token;
    use ethers::types::{Address, Log, U256};
    use tokio::sync::watch;
    use tokio::time::{sleep, timeout};

    use crate::factory::{
        address, child_interface, event_log, factory_domain, factory_interface, test_config,
        StubConnector, StubProvider, CHILD_A_ADDRESS, CHILD_B_ADDRESS, FACTORY_ADDRESS,
    };
    use crate::test_runner;

    fn child_created(child: &str, block_number: u64, log_index: u64) -> Log {
        event_log(&factory_interface(), "ChildCreated", address(FACTORY_ADDRESS))
            .indexed(Token::Address(address(child)))
            .data(vec![Token::Uint(U256::from(7))])
            .at(block_number, log_index)
            .build()
    }

    fn fee_updated(block_number: u64, log_index: u64) -> Log {
        event_log(&factory_interface(), "FeeUpdated", address(FACTORY_ADDRESS))
            .data(vec![Token::Uint(U256::from(30))])
            .at(block_number, log_index)
            .build()
    }

    fn ping(child: &str, block_number: u64, log_index: u64) -> Log {
        event_log(&child_interface(), "Ping", address(child))
            .indexed(Token::Address(Address::repeat_byte(0x42)))
            .data(vec![Token::Uint(U256::from(1))])
            .at(block_number, log_index)
            .build()
    }

    fn pong(child: &str, block_number: u64, log_index: u64) -> Log {
        event_log(&child_interface(), "Pong", address(child))
            .data(vec![Token::Uint(U256::from(2))])
            .at(block_number, log_index)
            .build()
    }

    fn creation_topic() -> ethers::types::H256 {
        factory_interface().get_event("ChildCreated").unwrap().signature()
    }

    #[tokio::test]
    pub async fn backfills_factory_and_child_streams() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path());
        let provider = StubProvider::new(1, 1_000).with_logs(vec![
            ping(CHILD_A_ADDRESS, 200, 0),
            pong(CHILD_A_ADDRESS, 151, 1),
            child_created(CHILD_A_ADDRESS, 150, 3),
            ping(CHILD_A_ADDRESS, 151, 0),
        ]);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        let report = indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        let factory_records = repo.load("factory").await;
        assert_eq!(factory_records.len(), 1);
        assert_eq!(factory_records[0].event_name, "ChildCreated");
        assert_eq!(factory_records[0].raw_arguments["child"], CHILD_A_ADDRESS);

        let child_positions: Vec<_> =
            repo.load("child").await.iter().map(|record| record.get_position()).collect();
        assert_eq!(child_positions, vec![(151, 0), (151, 1), (200, 0)]);

        assert_eq!(indexer.get_known_entities().get_addresses(), vec![address(CHILD_A_ADDRESS)]);
        assert_eq!(repo.get_checkpoint("factory").await, Some(1_000));
        assert_eq!(repo.get_checkpoint("child").await, Some(1_000));
        assert_eq!(report.records_added, 4);
        assert_eq!(report.discovered, 1);
        assert!(report.is_complete());
        assert_eq!(indexer.get_state(), IndexerState::Backfilling);
    }

    #[tokio::test]
    pub async fn queries_contiguous_bounded_chunks() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path()).with_genesis_block(100);
        let provider = StubProvider::new(1, 10_250);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        let creation_ranges: Vec<_> = provider
            .get_queried_filters()
            .into_iter()
            .filter(|filter| filter.topics == vec![creation_topic()])
            .map(|filter| (filter.from, filter.to))
            .collect();
        assert_eq!(
            creation_ranges,
            vec![
                (100, 2_099),
                (2_100, 4_099),
                (4_100, 6_099),
                (6_100, 8_099),
                (8_100, 10_099),
                (10_100, 10_250)
            ]
        );
    }

    #[tokio::test]
    pub async fn queries_new_children_within_their_creation_chunk() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path()).with_genesis_block(100).with_max_blocks_per_query(100);
        let provider = StubProvider::new(1, 399).with_logs(vec![
            child_created(CHILD_A_ADDRESS, 150, 0),
            ping(CHILD_A_ADDRESS, 160, 0),
            child_created(CHILD_B_ADDRESS, 390, 0),
            pong(CHILD_B_ADDRESS, 390, 1),
        ]);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        let child_queries: Vec<_> = provider
            .get_queried_filters()
            .into_iter()
            .filter(|filter| filter.topics.len() == 2)
            .map(|filter| (filter.addresses[0], filter.from, filter.to))
            .collect();
        assert!(child_queries.contains(&(address(CHILD_A_ADDRESS), 100, 199)));
        assert!(child_queries.contains(&(address(CHILD_B_ADDRESS), 300, 399)));
        assert!(!child_queries.contains(&(address(CHILD_B_ADDRESS), 200, 299)));

        let child_positions: Vec<_> =
            repo.load("child").await.iter().map(|record| record.get_position()).collect();
        assert_eq!(child_positions, vec![(160, 0), (390, 1)]);
    }

    #[tokio::test]
    pub async fn indexes_other_factory_events() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path());
        let provider = StubProvider::new(1, 50)
            .with_logs(vec![fee_updated(40, 2), child_created(CHILD_A_ADDRESS, 10, 0)]);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        let events: Vec<_> =
            repo.load("factory").await.into_iter().map(|record| record.event_name).collect();
        assert_eq!(events, vec!["ChildCreated", "FeeUpdated"]);
    }

    #[tokio::test]
    pub async fn rediscovers_children_after_a_restart() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path());
        let provider = StubProvider::new(1, 1_000).with_logs(vec![
            child_created(CHILD_A_ADDRESS, 150, 0),
            ping(CHILD_A_ADDRESS, 151, 0),
        ]);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;
        indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();
        drop(indexer);

        provider.set_block_number(1_200);
        provider.add_logs(vec![ping(CHILD_A_ADDRESS, 1_100, 0)]);
        provider.clear_queried_filters();
        let mut restarted =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        assert!(restarted.get_known_entities().is_empty());
        assert_eq!(restarted.rehydrate().await, 1);

        restarted.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        assert!(provider
            .get_queried_filters()
            .iter()
            .all(|filter| filter.from == 1_001 && filter.to == 1_200));
        let child_blocks: Vec<_> =
            repo.load("child").await.iter().map(|record| record.block_number).collect();
        assert_eq!(child_blocks, vec![151, 1_100]);
        assert_eq!(repo.get_checkpoint("child").await, Some(1_200));
    }

    #[tokio::test]
    pub async fn leaves_streams_of_unbound_factories_without_checkpoints() {
        let (dir, repo) = test_runner::new_repo().await;
        let mut config = test_config(dir.path());
        config.contracts = vec![ContractConfig::new("Factory", FACTORY_ADDRESS).inactive()];
        let provider = StubProvider::new(1, 1_000).with_logs(vec![
            child_created(CHILD_A_ADDRESS, 150, 0),
            ping(CHILD_A_ADDRESS, 151, 0),
        ]);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        let report = indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        assert_eq!(report.checkpoint, None);
        assert!(report.checkpointed_streams.is_empty());
        assert_eq!(repo.get_checkpoint("factory").await, None);
        assert_eq!(repo.get_checkpoint("child").await, None);
        assert!(repo.load("factory").await.is_empty());
        drop(indexer);

        // Activated on the next start
        let config = test_config(dir.path());
        let mut restarted =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        assert_eq!(restarted.get_resume_block().await, 0);
        let report = restarted.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        assert_eq!(report.checkpoint, Some(1_000));
        assert_eq!(repo.load("factory").await.len(), 1);
        assert_eq!(repo.load("child").await.len(), 1);
        assert_eq!(repo.get_checkpoint("factory").await, Some(1_000));
        assert_eq!(repo.get_checkpoint("child").await, Some(1_000));
    }

    #[tokio::test]
    pub async fn retries_failed_chunks_instead_of_skipping_past_them() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path()).with_max_blocks_per_query(100);
        let provider = StubProvider::new(1, 299).with_logs(vec![
            child_created(CHILD_A_ADDRESS, 50, 0),
            ping(CHILD_A_ADDRESS, 120, 0),
            ping(CHILD_A_ADDRESS, 250, 0),
        ]);
        provider.fail_range(100, 199);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        let report = indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.failed_chunks, vec![BlockRange::new(100, 199)]);
        assert_eq!(report.checkpoint, Some(99));
        assert_eq!(repo.get_checkpoint("factory").await, Some(99));
        // Later chunks still make progress
        let child_blocks: Vec<_> =
            repo.load("child").await.iter().map(|record| record.block_number).collect();
        assert_eq!(child_blocks, vec![250]);

        provider.heal_ranges();
        let report = indexer.poll_once(&test_runner::no_shutdown()).await.unwrap();

        assert_eq!(report.range, Some(BlockRange::new(100, 299)));
        assert_eq!(report.checkpoint, Some(299));
        assert_eq!(report.records_added, 1);
        let child_blocks: Vec<_> =
            repo.load("child").await.iter().map(|record| record.block_number).collect();
        assert_eq!(child_blocks, vec![120, 250]);
    }

    #[tokio::test]
    pub async fn skips_backfill_when_already_at_head() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path());
        repo.set_checkpoint("factory", 500).await.unwrap();
        repo.set_checkpoint("child", 500).await.unwrap();
        let provider = StubProvider::new(1, 500);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        let report = indexer.index_past_events(&test_runner::no_shutdown()).await.unwrap();

        assert_eq!(report, CycleReport::default());
        assert!(provider.get_queried_filters().is_empty());
        assert_eq!(indexer.get_next_block(), 501);
    }

    #[tokio::test]
    pub async fn resumes_after_the_least_advanced_stream() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path()).with_genesis_block(10);
        let provider = StubProvider::new(1, 500);
        let indexer = test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;

        assert_eq!(indexer.get_resume_block().await, 10);

        repo.set_checkpoint("factory", 300).await.unwrap();
        assert_eq!(indexer.get_resume_block().await, 10);

        repo.set_checkpoint("child", 200).await.unwrap();
        assert_eq!(indexer.get_resume_block().await, 201);
    }

    #[tokio::test]
    pub async fn rescanning_a_range_adds_nothing() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path());
        let provider = StubProvider::new(1, 1_000).with_logs(vec![
            child_created(CHILD_A_ADDRESS, 150, 0),
            ping(CHILD_A_ADDRESS, 151, 0),
            pong(CHILD_A_ADDRESS, 151, 1),
        ]);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;
        let range = BlockRange::new(0, 1_000);

        let first = indexer.run_range(range, &test_runner::no_shutdown()).await.unwrap();
        let second = indexer.run_range(range, &test_runner::no_shutdown()).await.unwrap();

        assert_eq!(first.records_added, 3);
        assert_eq!(second.records_added, 0);
        assert_eq!(second.discovered, 0);
        assert_eq!(repo.load("child").await.len(), 2);
    }

    #[tokio::test]
    pub async fn stops_between_chunks_on_shutdown() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path()).with_max_blocks_per_query(10);
        let provider = StubProvider::new(1, 1_000);
        let mut indexer =
            test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;
        let (_sender, shutdown) = watch::channel(true);

        let report = indexer.index_past_events(&shutdown).await.unwrap();

        assert_eq!(report.chunks, 0);
        assert_eq!(repo.get_checkpoint("factory").await, None);
    }

    #[tokio::test]
    pub async fn moves_from_backfilling_to_polling_until_shutdown() {
        let (dir, repo) = test_runner::new_repo().await;
        let config = test_config(dir.path()).with_poll_interval_ms(10);
        let provider =
            StubProvider::new(1, 100).with_logs(vec![child_created(CHILD_A_ADDRESS, 20, 0)]);
        let indexer = test_runner::new_indexer(&config, &provider, factory_domain(), &repo).await;
        let mut states = indexer.subscribe_to_state();
        let (shutdown_sender, shutdown) = watch::channel(false);

        let handle = tokio::spawn(indexer.run(shutdown));

        timeout(Duration::from_secs(5), async {
            while *states.borrow_and_update() != IndexerState::Polling {
                states.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        provider.add_logs(vec![ping(CHILD_A_ADDRESS, 150, 0)]);
        provider.set_block_number(160);
        timeout(Duration::from_secs(5), async {
            while repo.get_checkpoint("child").await != Some(160) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(repo.load("child").await.len(), 1);

        shutdown_sender.send(true).unwrap();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(*states.borrow(), IndexerState::Idle);
    }

    #[tokio::test]
    pub async fn index_events_runs_every_domain_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path()).with_poll_interval_ms(10);
        let provider = StubProvider::new(1, 300).with_logs(vec![
            child_created(CHILD_A_ADDRESS, 150, 0),
            ping(CHILD_A_ADDRESS, 151, 0),
        ]);

        let task = chainrecords::index_events(
            &config,
            StubConnector::new(provider.clone()),
            vec![factory_domain()],
        )
        .await
        .unwrap();

        timeout(Duration::from_secs(5), async {
            while task.get_indexer_state("test") != Some(IndexerState::Polling) {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let stats = task.get_repo().stats().await;
        assert_eq!(stats.get_stream("factory").unwrap().record_count, 1);
        assert_eq!(stats.get_stream("child").unwrap().record_count, 1);
        assert_eq!(stats.get_stream("child").unwrap().checkpoint, Some(300));

        task.stop().await;
        assert_eq!(task.get_indexer_state("test"), Some(IndexerState::Idle));
    }

    #[tokio::test]
    pub async fn index_events_refuses_the_wrong_chain() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let provider = StubProvider::new(137, 300);

        let result =
            chainrecords::index_events(&config, StubConnector::new(provider), vec![factory_domain()])
                .await;

        assert!(matches!(
            result,
            Err(ChainRecordsError::Connection(ConnectionError::NetworkMismatch { .. }))
        ));
    }
}
