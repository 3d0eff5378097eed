use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::Serialize;
use serde_json::Value;

use crate::events::EventRecord;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid stream name {0:?}")]
    InvalidStreamName(String),
}

/// Result of an append. A duplicate is not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AppendOutcome {
    #[display("added")]
    Added,
    #[display("already present")]
    AlreadyPresent,
}

impl AppendOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, AppendOutcome::Added)
    }
}

/// Read-side query over one stream
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// `(field, value)` equality filter on a record field or raw argument
    pub filter: Option<(String, String)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, field: &str, value: &str) -> Self {
        self.filter = Some((field.to_string(), value.to_string()));

        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;

        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);

        self
    }

    pub fn apply(&self, records: Vec<EventRecord>) -> Vec<EventRecord> {
        let filtered = records.into_iter().filter(|record| match &self.filter {
            Some((field, value)) => record.matches(field, value),
            None => true,
        });

        filtered.skip(self.offset).take(self.limit.unwrap_or(usize::MAX)).collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreamStats {
    pub stream: String,
    pub record_count: usize,
    pub file_size_bytes: u64,
    pub checkpoint: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub streams: Vec<StreamStats>,
    pub projection_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl StoreStats {
    pub fn get_stream(&self, stream: &str) -> Option<&StreamStats> {
        self.streams.iter().find(|s| s.stream == stream)
    }
}

/// Durable, de-duplicated event log with checkpoints and projections.
///
/// Each stream has exactly one writer (the engine owning it). Reads may come
/// from anywhere.
#[async_trait::async_trait]
pub trait Repo: Sync + Send + Debug {
    async fn append(&self, stream: &str, record: EventRecord) -> Result<AppendOutcome, RepoError>;
    /// Same semantics as repeated `append`, persisted with a single write.
    /// Returns how many records were added.
    async fn append_batch(
        &self,
        stream: &str,
        records: Vec<EventRecord>,
    ) -> Result<usize, RepoError>;
    /// Never fails: unreadable content is quarantined and an empty stream returned
    async fn load(&self, stream: &str) -> Vec<EventRecord>;

    async fn get_checkpoint(&self, stream: &str) -> Option<u64>;
    /// Returns false when `block_number` would not move the checkpoint forward
    async fn set_checkpoint(&self, stream: &str, block_number: u64) -> Result<bool, RepoError>;

    async fn put_projection(&self, key: &str, value: Value) -> Result<(), RepoError>;
    async fn get_projection(&self, key: &str) -> Option<Value>;
    async fn get_all_projections(&self) -> BTreeMap<String, Value>;

    async fn get_records(&self, stream: &str, query: &RecordQuery) -> Vec<EventRecord> {
        query.apply(self.load(stream).await)
    }
    async fn stats(&self) -> StoreStats;
}
