use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::contracts::ContractConfig;
use crate::{Chain, ChainId};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("json_rpc_url must not be empty")]
    MissingJsonRpcUrl,
    #[error("max_blocks_per_query must be greater than zero")]
    ZeroBlockRange,
    #[error("poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
    #[error("contract {0} is configured more than once")]
    DuplicateContract(String),
    #[error("chain id {0} is not a known EVM chain")]
    UnknownChain(u64),
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Everything the indexer needs, supplied once at startup
#[derive(Clone, Debug)]
pub struct Config {
    pub chain: Chain,
    pub store_dir: PathBuf,
    pub contracts: Vec<ContractConfig>,
    /// First block to backfill from when a stream has no checkpoint
    pub genesis_block: u64,
    pub max_blocks_per_query: u64,
    pub poll_interval_ms: u64,
    /// Pause between backfill chunks to stay under provider rate limits
    pub chunk_delay_ms: u64,
    pub connect_retries: u32,
    pub connect_retry_delay_ms: u64,
    pub health_check_interval_ms: u64,
    pub reconnect_backoff_ceiling_ms: u64,
}

impl Config {
    pub fn new(chain: Chain, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            chain,
            store_dir: store_dir.into(),
            contracts: vec![],
            genesis_block: 0,
            max_blocks_per_query: 2_000,
            poll_interval_ms: 10_000,
            chunk_delay_ms: 250,
            connect_retries: 5,
            connect_retry_delay_ms: 2_000,
            health_check_interval_ms: 30_000,
            reconnect_backoff_ceiling_ms: 60_000,
        }
    }

    pub fn add_contract(mut self, contract: ContractConfig) -> Self {
        self.contracts.push(contract);

        self
    }

    pub fn with_json_rpc_url(mut self, json_rpc_url: &str) -> Self {
        self.chain.json_rpc_url = json_rpc_url.to_string();

        self
    }

    pub fn with_genesis_block(mut self, genesis_block: u64) -> Self {
        self.genesis_block = genesis_block;

        self
    }

    pub fn with_max_blocks_per_query(mut self, max_blocks_per_query: u64) -> Self {
        self.max_blocks_per_query = max_blocks_per_query;

        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;

        self
    }

    pub fn with_chunk_delay_ms(mut self, chunk_delay_ms: u64) -> Self {
        self.chunk_delay_ms = chunk_delay_ms;

        self
    }

    pub fn with_connect_retries(mut self, connect_retries: u32, retry_delay_ms: u64) -> Self {
        self.connect_retries = connect_retries;
        self.connect_retry_delay_ms = retry_delay_ms;

        self
    }

    pub fn with_health_check(mut self, interval_ms: u64, backoff_ceiling_ms: u64) -> Self {
        self.health_check_interval_ms = interval_ms;
        self.reconnect_backoff_ceiling_ms = backoff_ceiling_ms;

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.json_rpc_url.trim().is_empty() {
            return Err(ConfigError::MissingJsonRpcUrl);
        }
        if self.max_blocks_per_query == 0 {
            return Err(ConfigError::ZeroBlockRange);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        let mut names: Vec<_> = self.contracts.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        if let Some(duplicate) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConfigError::DuplicateContract(duplicate[0].to_string()));
        }

        Ok(())
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&raw).map_err(|error| match error {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;

        file.try_into()
    }
}

/// On-disk shape of [`Config`]. Every tunable is optional.
#[derive(Debug, Deserialize)]
struct FileConfig {
    json_rpc_url: String,
    chain_id: u64,
    #[serde(default = "default_store_dir")]
    store_dir: PathBuf,
    #[serde(default)]
    genesis_block: Option<u64>,
    #[serde(default)]
    max_blocks_per_query: Option<u64>,
    #[serde(default)]
    poll_interval_ms: Option<u64>,
    #[serde(default)]
    chunk_delay_ms: Option<u64>,
    #[serde(default)]
    connect_retries: Option<u32>,
    #[serde(default)]
    connect_retry_delay_ms: Option<u64>,
    #[serde(default)]
    health_check_interval_ms: Option<u64>,
    #[serde(default)]
    reconnect_backoff_ceiling_ms: Option<u64>,
    #[serde(default)]
    contracts: Vec<ContractConfig>,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data")
}

impl TryFrom<FileConfig> for Config {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let chain_id =
            ChainId::try_from(file.chain_id).map_err(|_| ConfigError::UnknownChain(file.chain_id))?;
        let mut config = Config::new(Chain::new(chain_id, &file.json_rpc_url), file.store_dir);

        config.contracts = file.contracts;
        if let Some(genesis_block) = file.genesis_block {
            config.genesis_block = genesis_block;
        }
        if let Some(max_blocks_per_query) = file.max_blocks_per_query {
            config.max_blocks_per_query = max_blocks_per_query;
        }
        if let Some(poll_interval_ms) = file.poll_interval_ms {
            config.poll_interval_ms = poll_interval_ms;
        }
        if let Some(chunk_delay_ms) = file.chunk_delay_ms {
            config.chunk_delay_ms = chunk_delay_ms;
        }
        if let Some(connect_retries) = file.connect_retries {
            config.connect_retries = connect_retries;
        }
        if let Some(connect_retry_delay_ms) = file.connect_retry_delay_ms {
            config.connect_retry_delay_ms = connect_retry_delay_ms;
        }
        if let Some(health_check_interval_ms) = file.health_check_interval_ms {
            config.health_check_interval_ms = health_check_interval_ms;
        }
        if let Some(reconnect_backoff_ceiling_ms) = file.reconnect_backoff_ceiling_ms {
            config.reconnect_backoff_ceiling_ms = reconnect_backoff_ceiling_ms;
        }

        Ok(config)
    }
}
