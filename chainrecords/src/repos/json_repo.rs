use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::files::{self, write_atomically};
use super::repo::{AppendOutcome, Repo, RepoError, StoreStats, StreamStats};
use crate::events::{DedupKey, EventRecord};

const STREAMS_DIR: &str = "streams";
const CHECKPOINTS_FILE: &str = "checkpoints.json";
const PROJECTIONS_FILE: &str = "projections.json";

/// Per-stream state. `keys` is populated on first access.
#[derive(Default)]
struct StreamState {
    keys: Option<HashSet<DedupKey>>,
}

/// Record store backed by human-readable JSON files:
///
/// ```text
/// <dir>/streams/<stream>.json   sorted array of records
/// <dir>/checkpoints.json        stream -> last processed block
/// <dir>/projections.json        key -> projection
/// ```
#[derive(Debug)]
pub struct JsonRepo {
    dir: PathBuf,
    streams: std::sync::Mutex<HashMap<String, Arc<Mutex<StreamState>>>>,
    checkpoints: Mutex<()>,
    projections: Mutex<Option<BTreeMap<String, Value>>>,
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("keys", &self.keys.as_ref().map(|keys| keys.len()))
            .finish()
    }
}

impl JsonRepo {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let dir = dir.into();
        files::ensure_dir(&dir.join(STREAMS_DIR)).await?;

        Ok(Self {
            dir,
            streams: std::sync::Mutex::new(HashMap::new()),
            checkpoints: Mutex::new(()),
            projections: Mutex::new(None),
        })
    }

    pub fn get_dir(&self) -> &Path {
        &self.dir
    }

    pub fn get_stream_path(&self, stream: &str) -> PathBuf {
        self.dir.join(STREAMS_DIR).join(format!("{stream}.json"))
    }

    fn get_checkpoints_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINTS_FILE)
    }

    fn get_projections_path(&self) -> PathBuf {
        self.dir.join(PROJECTIONS_FILE)
    }

    fn get_stream_state(&self, stream: &str) -> Result<Arc<Mutex<StreamState>>, RepoError> {
        validate_stream_name(stream)?;

        let mut streams = self.streams.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        Ok(streams.entry(stream.to_string()).or_default().clone())
    }

    /// Reads a stream, quarantining it if it cannot be parsed
    async fn read_stream(&self, stream: &str) -> Vec<EventRecord> {
        let path = self.get_stream_path(stream);

        let contents = match files::read_if_exists(&path).await {
            Ok(Some(contents)) => contents,
            Ok(None) => return vec![],
            Err(error) => {
                self.recover_corrupted(stream, &path, &error.to_string()).await;
                return vec![];
            }
        };

        match serde_json::from_slice::<Vec<EventRecord>>(&contents) {
            Ok(records) => records,
            Err(error) => {
                self.recover_corrupted(stream, &path, &error.to_string()).await;
                vec![]
            }
        }
    }

    async fn recover_corrupted(&self, stream: &str, path: &Path, reason: &str) {
        match files::quarantine(path).await {
            Ok(quarantined_path) => {
                warn!(
                    stream,
                    reason,
                    quarantined = %quarantined_path.display(),
                    "stream file is corrupted, continuing with an empty stream"
                );

                if let Err(error) = write_atomically(path, b"[]").await {
                    error!(stream, %error, "cannot reset corrupted stream file");
                }
            }
            Err(error) => {
                error!(stream, reason, %error, "stream file is corrupted and cannot be quarantined");
            }
        }
    }

    async fn ensure_keys<'a>(
        &self,
        stream: &str,
        state: &'a mut StreamState,
    ) -> &'a mut HashSet<DedupKey> {
        if state.keys.is_none() {
            let records = self.read_stream(stream).await;
            state.keys = Some(records.iter().map(|r| r.get_dedup_key()).collect());
        }

        state.keys.get_or_insert_with(HashSet::new)
    }

    async fn write_stream(&self, stream: &str, records: &[EventRecord]) -> Result<(), RepoError> {
        let contents = serde_json::to_vec_pretty(records)?;

        write_atomically(&self.get_stream_path(stream), &contents).await
    }

    /// Callers hold the checkpoints lock
    async fn read_checkpoints(&self) -> BTreeMap<String, u64> {
        let path = self.get_checkpoints_path();

        match files::read_if_exists(&path).await {
            Ok(Some(contents)) => match serde_json::from_slice(&contents) {
                Ok(checkpoints) => checkpoints,
                Err(error) => {
                    self.recover_corrupted_checkpoints(&path, &error.to_string()).await;
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(error) => {
                warn!(%error, "cannot read checkpoints, treating every stream as new");
                BTreeMap::new()
            }
        }
    }

    async fn recover_corrupted_checkpoints(&self, path: &Path, reason: &str) {
        match files::quarantine(path).await {
            Ok(quarantined_path) => {
                warn!(
                    reason,
                    quarantined = %quarantined_path.display(),
                    "checkpoints are unreadable, treating every stream as new"
                );

                if let Err(error) = write_atomically(path, b"{}").await {
                    error!(%error, "cannot reset unreadable checkpoints");
                }
            }
            Err(error) => error!(reason, %error, "checkpoints are unreadable and cannot be quarantined"),
        }
    }

    async fn ensure_projections<'a>(
        &self,
        projections: &'a mut Option<BTreeMap<String, Value>>,
    ) -> &'a mut BTreeMap<String, Value> {
        if projections.is_none() {
            let path = self.get_projections_path();
            let loaded = match files::read_if_exists(&path).await {
                Ok(Some(contents)) => match serde_json::from_slice(&contents) {
                    Ok(loaded) => loaded,
                    Err(error) => {
                        self.recover_corrupted_projections(&path, &error.to_string()).await;
                        BTreeMap::new()
                    }
                },
                Ok(None) => BTreeMap::new(),
                Err(error) => {
                    self.recover_corrupted_projections(&path, &error.to_string()).await;
                    BTreeMap::new()
                }
            };

            *projections = Some(loaded);
        }

        projections.get_or_insert_with(BTreeMap::new)
    }

    async fn recover_corrupted_projections(&self, path: &Path, reason: &str) {
        match files::quarantine(path).await {
            Ok(quarantined_path) => warn!(
                reason,
                quarantined = %quarantined_path.display(),
                "projections are corrupted, they will be rebuilt from new events"
            ),
            Err(error) => error!(reason, %error, "projections are corrupted and cannot be quarantined"),
        }
    }

    async fn list_stream_files(&self) -> Vec<(String, u64)> {
        let mut stream_files = vec![];

        let Ok(mut entries) = tokio::fs::read_dir(self.dir.join(STREAMS_DIR)).await else {
            return stream_files;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(stream) = file_name.strip_suffix(".json") else {
                continue;
            };
            if validate_stream_name(stream).is_err() {
                continue;
            }

            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            stream_files.push((stream.to_string(), size));
        }

        stream_files.sort();
        stream_files
    }
}

/// Stream names become file names
fn validate_stream_name(stream: &str) -> Result<(), RepoError> {
    let is_valid = !stream.is_empty()
        && stream.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if is_valid {
        Ok(())
    } else {
        Err(RepoError::InvalidStreamName(stream.to_string()))
    }
}

#[async_trait::async_trait]
impl Repo for JsonRepo {
    async fn append(&self, stream: &str, record: EventRecord) -> Result<AppendOutcome, RepoError> {
        let added = self.append_batch(stream, vec![record]).await?;

        Ok(if added > 0 {
            AppendOutcome::Added
        } else {
            AppendOutcome::AlreadyPresent
        })
    }

    async fn append_batch(
        &self,
        stream: &str,
        records: Vec<EventRecord>,
    ) -> Result<usize, RepoError> {
        let state = self.get_stream_state(stream)?;
        let mut state = state.lock().await;

        let keys = self.ensure_keys(stream, &mut state).await;
        if records.iter().all(|record| keys.contains(&record.get_dedup_key())) {
            return Ok(0);
        }

        // Keys are rebuilt from what is on disk, which drops the ones of a
        // stream quarantined since they were cached
        let mut persisted = self.read_stream(stream).await;
        let mut keys: HashSet<DedupKey> = persisted.iter().map(|r| r.get_dedup_key()).collect();

        let already_persisted = persisted.len();
        for record in records {
            if keys.insert(record.get_dedup_key()) {
                persisted.push(record);
            }
        }
        let added = persisted.len() - already_persisted;

        if added > 0 {
            persisted.sort_by_key(|record| record.get_position());

            if let Err(error) = self.write_stream(stream, &persisted).await {
                state.keys = None;
                return Err(error);
            }
        }

        // Only remember keys once they are durable
        state.keys = Some(keys);
        debug!(stream, added, total = persisted.len(), "appended records");

        Ok(added)
    }

    async fn load(&self, stream: &str) -> Vec<EventRecord> {
        let state = match self.get_stream_state(stream) {
            Ok(state) => state,
            Err(error) => {
                warn!(stream, %error, "refusing to load stream");
                return vec![];
            }
        };
        let mut state = state.lock().await;

        let records = self.read_stream(stream).await;
        state.keys = Some(records.iter().map(|r| r.get_dedup_key()).collect());

        records
    }

    async fn get_checkpoint(&self, stream: &str) -> Option<u64> {
        let _guard = self.checkpoints.lock().await;

        self.read_checkpoints().await.get(stream).copied()
    }

    async fn set_checkpoint(&self, stream: &str, block_number: u64) -> Result<bool, RepoError> {
        let _guard = self.checkpoints.lock().await;
        let mut checkpoints = self.read_checkpoints().await;

        if checkpoints.get(stream).is_some_and(|current| *current >= block_number) {
            return Ok(false);
        }

        checkpoints.insert(stream.to_string(), block_number);
        write_atomically(
            &self.get_checkpoints_path(),
            &serde_json::to_vec_pretty(&checkpoints)?,
        )
        .await?;

        Ok(true)
    }

    async fn put_projection(&self, key: &str, value: Value) -> Result<(), RepoError> {
        let mut projections = self.projections.lock().await;
        let projections = self.ensure_projections(&mut projections).await;

        projections.insert(key.to_string(), value);

        write_atomically(
            &self.get_projections_path(),
            &serde_json::to_vec_pretty(&projections)?,
        )
        .await
    }

    async fn get_projection(&self, key: &str) -> Option<Value> {
        let mut projections = self.projections.lock().await;

        self.ensure_projections(&mut projections).await.get(key).cloned()
    }

    async fn get_all_projections(&self) -> BTreeMap<String, Value> {
        let mut projections = self.projections.lock().await;

        self.ensure_projections(&mut projections).await.clone()
    }

    async fn stats(&self) -> StoreStats {
        let checkpoints = {
            let _guard = self.checkpoints.lock().await;
            self.read_checkpoints().await
        };

        let mut streams = vec![];
        for (stream, file_size_bytes) in self.list_stream_files().await {
            let record_count = self.load(&stream).await.len();

            streams.push(StreamStats {
                checkpoint: checkpoints.get(&stream).copied(),
                stream,
                record_count,
                file_size_bytes,
            });
        }

        for (stream, checkpoint) in checkpoints.iter() {
            if !streams.iter().any(|s| &s.stream == stream) {
                streams.push(StreamStats {
                    stream: stream.clone(),
                    record_count: 0,
                    file_size_bytes: 0,
                    checkpoint: Some(*checkpoint),
                });
            }
        }

        StoreStats {
            streams,
            projection_count: self.get_all_projections().await.len(),
            generated_at: chrono::Utc::now(),
        }
    }
}
