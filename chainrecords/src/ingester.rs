mod chunks;
mod error;
mod filters;
mod ingest_events;
mod known_entities;
mod token_decimals;

pub use chunks::{get_chunks, BlockRange};
pub use error::IngesterError;
pub use ingest_events::ChunkReport;
pub use known_entities::KnownEntities;
pub use token_decimals::TokenDecimals;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use derive_more::Display;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionManager, Provider};
use crate::domains::Domain;
use crate::repos::Repo;
use crate::{ChainRecordsRepo, Config};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum IndexerState {
    #[display("idle")]
    Idle,
    #[display("backfilling")]
    Backfilling,
    #[display("polling")]
    Polling,
}

#[derive(Debug, Clone)]
pub struct IndexerSettings {
    /// First block indexed when a stream has no checkpoint
    pub genesis_block: u64,
    pub poll_interval: Duration,
    /// Pause between chunks, to stay under provider rate limits
    pub chunk_delay: Duration,
}

impl IndexerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            genesis_block: config.genesis_block,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
        }
    }
}

/// Outcome of one backfill or poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub range: Option<BlockRange>,
    pub chunks: usize,
    pub failed_chunks: Vec<BlockRange>,
    pub records_added: usize,
    pub discovered: usize,
    pub projections_built: usize,
    /// Checkpoint written at the end of the cycle, if any stream was covered
    pub checkpoint: Option<u64>,
    /// Streams the checkpoint was written to
    pub checkpointed_streams: BTreeSet<String>,
}

impl CycleReport {
    fn absorb(&mut self, chunk: ChunkReport) {
        self.records_added += chunk.records_added;
        self.discovered += chunk.discovered;
        self.projections_built += chunk.projections_built;
    }

    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

/// Indexing engine for one domain. Sole writer to the domain's streams.
pub struct Indexer<P: Provider> {
    domain: Arc<Domain>,
    connection: Arc<ConnectionManager<P>>,
    repo: Arc<ChainRecordsRepo>,
    settings: IndexerSettings,
    known_entities: KnownEntities,
    token_decimals: TokenDecimals,
    next_block: u64,
    state: watch::Sender<IndexerState>,
}

impl<P: Provider> Indexer<P> {
    pub fn new(
        domain: Arc<Domain>,
        connection: Arc<ConnectionManager<P>>,
        repo: Arc<ChainRecordsRepo>,
        settings: IndexerSettings,
    ) -> Self {
        let (state, _) = watch::channel(IndexerState::Idle);

        Self {
            next_block: settings.genesis_block,
            domain,
            connection,
            repo,
            settings,
            known_entities: KnownEntities::new(),
            token_decimals: TokenDecimals::new(),
            state,
        }
    }

    pub fn get_domain(&self) -> &Domain {
        &self.domain
    }

    pub fn get_state(&self) -> IndexerState {
        *self.state.borrow()
    }

    pub fn subscribe_to_state(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    pub fn get_known_entities(&self) -> &KnownEntities {
        &self.known_entities
    }

    /// First block the next cycle will cover
    pub fn get_next_block(&self) -> u64 {
        self.next_block
    }

    fn set_state(&self, state: IndexerState) {
        self.state.send_replace(state);
        debug!(domain = %self.domain.name, %state, "indexer state changed");
    }

    /// Repopulates known children from persisted creation records
    pub async fn rehydrate(&mut self) -> usize {
        self.known_entities = KnownEntities::rehydrate(&self.domain, self.repo.as_ref()).await;

        self.known_entities.len()
    }

    /// Streams this engine can fully index with the current bindings
    pub async fn get_covered_streams(&self) -> BTreeSet<String> {
        let bound_factories = ingest_events::get_bound_factories(&self.domain, &self.connection).await;

        ingest_events::get_covered_streams(&self.domain, &bound_factories)
    }

    /// Resumes after the least advanced covered stream. A covered stream that
    /// was never checkpointed, such as one whose factory was just bound, sends
    /// the whole domain back to genesis.
    pub async fn get_resume_block(&self) -> u64 {
        let mut resume_block: Option<u64> = None;

        for stream in self.get_covered_streams().await {
            let Some(checkpoint) = self.repo.get_checkpoint(&stream).await else {
                return self.settings.genesis_block;
            };

            let next = checkpoint.saturating_add(1);
            resume_block = Some(resume_block.map_or(next, |block| block.min(next)));
        }

        resume_block.unwrap_or(self.settings.genesis_block).max(self.settings.genesis_block)
    }

    /// Replays history from the resume block up to the current head
    pub async fn index_past_events(
        &mut self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, IngesterError> {
        self.set_state(IndexerState::Backfilling);
        self.next_block = self.get_resume_block().await;

        info!(domain = %self.domain.name, from = self.next_block, "backfilling");

        self.catch_up(shutdown).await
    }

    /// One polling tick: indexes whatever the head advanced by
    pub async fn poll_once(
        &mut self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, IngesterError> {
        self.catch_up(shutdown).await
    }

    async fn catch_up(
        &mut self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, IngesterError> {
        let current_height = self.connection.current_block_height().await?;

        if self.next_block > current_height {
            debug!(
                domain = %self.domain.name,
                next_block = self.next_block,
                current_height,
                "nothing new to index"
            );
            return Ok(CycleReport::default());
        }

        self.run_range(BlockRange::new(self.next_block, current_height), shutdown).await
    }

    /// Indexes `range` chunk by chunk. A failed chunk does not stop later
    /// chunks, but the checkpoint only covers the leading run of successful
    /// ones so the failed range is revisited next cycle. Streams with an
    /// unbound source in any of those chunks are not checkpointed.
    pub async fn run_range(
        &mut self,
        range: BlockRange,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleReport, IngesterError> {
        let chunks = get_chunks(range.from, range.to, self.connection.max_range_for_query());
        let mut report = CycleReport {
            range: Some(range),
            ..Default::default()
        };
        let mut completed_through = None;
        let mut covered_streams: Option<BTreeSet<String>> = None;

        for (index, chunk) in chunks.into_iter().enumerate() {
            if *shutdown.borrow() {
                info!(domain = %self.domain.name, %chunk, "shutdown requested, stopping before chunk");
                break;
            }

            if index > 0 && !self.settings.chunk_delay.is_zero() {
                sleep(self.settings.chunk_delay).await;
            }

            let result = ingest_events::run(
                &self.domain,
                &self.connection,
                &self.repo,
                &mut self.known_entities,
                &mut self.token_decimals,
                chunk,
            )
            .await;

            report.chunks += 1;
            match result {
                Ok(chunk_report) => {
                    if report.failed_chunks.is_empty() {
                        completed_through = Some(chunk.to);
                        covered_streams = Some(match covered_streams.take() {
                            Some(streams) => streams
                                .intersection(&chunk_report.covered_streams)
                                .cloned()
                                .collect(),
                            None => chunk_report.covered_streams.clone(),
                        });
                    }
                    report.absorb(chunk_report);
                }
                Err(error) => {
                    warn!(domain = %self.domain.name, %chunk, %error, "skipping chunk");
                    report.failed_chunks.push(chunk);
                }
            }
        }

        if let Some(block_number) = completed_through {
            let streams = covered_streams.unwrap_or_default();
            self.checkpoint(&streams, block_number).await?;
            self.next_block = block_number + 1;

            if !streams.is_empty() {
                report.checkpoint = Some(block_number);
            }
            report.checkpointed_streams = streams;
        }

        info!(
            domain = %self.domain.name,
            from = range.from,
            to = range.to,
            chunks = report.chunks,
            failed = report.failed_chunks.len(),
            records = report.records_added,
            discovered = report.discovered,
            "indexed range"
        );

        Ok(report)
    }

    async fn checkpoint(
        &self,
        streams: &BTreeSet<String>,
        block_number: u64,
    ) -> Result<(), IngesterError> {
        for stream in streams.iter() {
            if !self.repo.set_checkpoint(stream, block_number).await? {
                debug!(%stream, block_number, "checkpoint already ahead");
            }
        }

        Ok(())
    }

    /// Backfills, then polls until shutdown. Returns once stopped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let known = self.rehydrate().await;
        info!(domain = %self.domain.name, known, "indexer starting");

        if let Err(error) = self.index_past_events(&shutdown).await {
            error!(domain = %self.domain.name, %error, "backfill failed, polling will retry");
        }

        self.set_state(IndexerState::Polling);

        let mut interval = interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(error) = self.poll_once(&shutdown).await {
                warn!(domain = %self.domain.name, %error, "poll failed");
            }
        }

        self.set_state(IndexerState::Idle);
        info!(domain = %self.domain.name, next_block = self.next_block, "indexer stopped");
    }
}
