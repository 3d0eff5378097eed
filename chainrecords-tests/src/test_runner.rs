use std::sync::Arc;

use chainrecords::connection::ConnectionSettings;
use chainrecords::{
    ChainRecordsRepo, Config, ConnectionManager, Domain, Indexer, IndexerSettings, JsonRepo,
};
use tempfile::TempDir;
use tokio::sync::watch;

use crate::factory::{StubConnector, StubProvider};

/// Store in a throwaway directory. Keep the `TempDir` alive for the test.
pub async fn new_repo() -> (TempDir, Arc<ChainRecordsRepo>) {
    let dir = tempfile::tempdir().unwrap();
    let repo = JsonRepo::open(dir.path()).await.unwrap();

    (dir, Arc::new(repo))
}

pub fn new_connection(
    config: &Config,
    connector: StubConnector,
    domain: &Domain,
) -> ConnectionManager<StubProvider> {
    ConnectionManager::new(
        ConnectionSettings::from_config(config),
        connector,
        domain.get_builtin_interfaces(),
    )
}

pub async fn connected(
    config: &Config,
    provider: &StubProvider,
    domain: &Domain,
) -> Arc<ConnectionManager<StubProvider>> {
    let connection = new_connection(config, StubConnector::new(provider.clone()), domain);
    connection.connect().await.unwrap();
    connection.load_bindings(&config.contracts).await;

    Arc::new(connection)
}

pub async fn new_indexer(
    config: &Config,
    provider: &StubProvider,
    domain: Domain,
    repo: &Arc<ChainRecordsRepo>,
) -> Indexer<StubProvider> {
    let connection = connected(config, provider, &domain).await;

    Indexer::new(
        Arc::new(domain),
        connection,
        repo.clone(),
        IndexerSettings::from_config(config),
    )
}

/// A shutdown signal that never fires
pub fn no_shutdown() -> watch::Receiver<bool> {
    let (_, shutdown) = watch::channel(false);

    shutdown
}

