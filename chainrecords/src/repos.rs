mod files;
mod json_repo;
mod repo;

pub use json_repo::JsonRepo;
pub use repo::{AppendOutcome, RecordQuery, Repo, RepoError, StoreStats, StreamStats};

pub use files::get_temporary_path;
