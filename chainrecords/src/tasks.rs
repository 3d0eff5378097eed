use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ingester::IndexerState;
use crate::ChainRecordsRepo;

/// Handle on everything `index_events` spawned: one engine per domain plus
/// the connection health check.
#[derive(Clone)]
pub struct IndexingTask {
    shutdown: Arc<watch::Sender<bool>>,
    subtasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    states: Vec<(String, watch::Receiver<IndexerState>)>,
    repo: Arc<ChainRecordsRepo>,
}

impl IndexingTask {
    pub fn new(shutdown: watch::Sender<bool>, repo: Arc<ChainRecordsRepo>) -> Self {
        Self {
            shutdown: Arc::new(shutdown),
            subtasks: Arc::new(Mutex::new(vec![])),
            states: vec![],
            repo,
        }
    }

    pub async fn add_subtask(&self, subtask: JoinHandle<()>) {
        self.subtasks.lock().await.push(subtask);
    }

    pub fn watch_indexer(&mut self, domain: &str, state: watch::Receiver<IndexerState>) {
        self.states.push((domain.to_string(), state));
    }

    pub fn get_indexer_state(&self, domain: &str) -> Option<IndexerState> {
        self.states.iter().find(|(name, _)| name == domain).map(|(_, state)| *state.borrow())
    }

    /// Read side of the store, for query surfaces
    pub fn get_repo(&self) -> Arc<ChainRecordsRepo> {
        self.repo.clone()
    }

    pub fn subscribe_to_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signals shutdown and waits for every subtask. Engines finish their
    /// in-flight chunk first.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let subtasks: Vec<_> = self.subtasks.lock().await.drain(..).collect();
        for result in join_all(subtasks).await {
            if let Err(error) = result {
                warn!(%error, "indexing subtask ended abnormally");
            }
        }

        info!("indexing stopped");
    }
}
