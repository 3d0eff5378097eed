mod chains;
mod config;
pub mod connection;
pub mod contracts;
pub mod domains;
pub mod events;
pub mod ingester;
pub mod logging;
pub mod projections;
mod repos;
mod tasks;

pub use chains::{Chain, ChainId};
pub use config::{Config, ConfigError};
pub use connection::{ConnectionError, ConnectionManager, ConnectionSettings};
pub use contracts::{ContractConfig, ContractHandle, Interface};
pub use domains::Domain;
pub use events::EventRecord;
pub use ingester::{Indexer, IndexerSettings, IndexerState};
pub use repos::*;
pub use tasks::IndexingTask;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use connection::{Connector, HealthCheck, Provider};
use contracts::InterfaceError;

pub use ethers::types::{Address, U256};

pub type ChainRecordsRepo = JsonRepo;

#[derive(Debug, thiserror::Error)]
pub enum ChainRecordsError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("store error: {0}")]
    Repo(#[from] RepoError),
    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),
}

/// Starts indexing every domain against the configured chain.
///
/// Fails when the configuration is invalid, the endpoint cannot be reached
/// within the configured retries, or it reports a different chain. After
/// that, connection trouble is handled in the background.
pub async fn index_events<P: Provider>(
    config: &Config,
    connector: impl Connector<P>,
    domains: Vec<Domain>,
) -> Result<IndexingTask, ChainRecordsError> {
    config.validate()?;

    let builtin_interfaces = domains::get_builtin_interfaces(&domains);
    let connection = Arc::new(
        ConnectionManager::new(
            ConnectionSettings::from_config(config),
            connector,
            builtin_interfaces,
        )
        .with_contract_configs(&config.contracts),
    );
    connection.connect().await?;
    connection.reload_bindings().await;

    let repo = Arc::new(ChainRecordsRepo::open(&config.store_dir).await?);

    let (shutdown, _) = watch::channel(false);
    let mut indexing_task = IndexingTask::new(shutdown, repo.clone());

    let health_check =
        HealthCheck::start(connection.clone(), indexing_task.subscribe_to_shutdown());
    indexing_task.add_subtask(health_check).await;

    let settings = IndexerSettings::from_config(config);
    for domain in domains {
        let indexer = Indexer::new(
            Arc::new(domain),
            connection.clone(),
            repo.clone(),
            settings.clone(),
        );
        indexing_task.watch_indexer(&indexer.get_domain().name, indexer.subscribe_to_state());

        let shutdown = indexing_task.subscribe_to_shutdown();
        indexing_task.add_subtask(tokio::spawn(indexer.run(shutdown))).await;
    }

    info!(store_dir = %config.store_dir.display(), "indexing started");

    Ok(indexing_task)
}
