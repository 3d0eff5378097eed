use crate::connection::ConnectionError;
use crate::repos::RepoError;

use super::chunks::BlockRange;

#[derive(Debug, thiserror::Error)]
pub enum IngesterError {
    /// A chunk's log query failed. The chunk is skipped for this cycle.
    #[error("log query over {range} failed: {reason}")]
    QueryRange { range: BlockRange, reason: String },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl IngesterError {
    pub fn query_range(range: BlockRange, reason: impl ToString) -> Self {
        IngesterError::QueryRange {
            range,
            reason: reason.to_string(),
        }
    }
}
