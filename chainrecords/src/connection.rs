mod error;
mod health;
mod provider;

pub use error::ConnectionError;
pub use health::HealthCheck;
pub use provider::{ContractCaller, Connector, HttpConnector, Provider, ProviderError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::contracts::{ContractBinding, ContractConfig, Interface};
use crate::Config;

#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub json_rpc_url: String,
    pub expected_chain_id: u64,
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
    pub health_check_interval: Duration,
    pub reconnect_backoff_ceiling: Duration,
    pub max_blocks_per_query: u64,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            json_rpc_url: config.chain.json_rpc_url.clone(),
            expected_chain_id: config.chain.id_as_u64(),
            connect_retries: config.connect_retries,
            connect_retry_delay: Duration::from_millis(config.connect_retry_delay_ms),
            health_check_interval: Duration::from_millis(config.health_check_interval_ms),
            reconnect_backoff_ceiling: Duration::from_millis(config.reconnect_backoff_ceiling_ms),
            max_blocks_per_query: config.max_blocks_per_query,
        }
    }
}

/// Owns the RPC connection and the named contract bindings.
///
/// The provider slot is emptied while a reconnect is in flight, so callers
/// observe `ConnectionError::Unavailable` instead of a half-reconnected handle.
pub struct ConnectionManager<P: Provider> {
    settings: ConnectionSettings,
    connector: Arc<dyn Connector<P>>,
    provider: RwLock<Option<Arc<P>>>,
    bindings: RwLock<HashMap<String, ContractBinding>>,
    contract_configs: RwLock<Vec<ContractConfig>>,
    builtin_interfaces: HashMap<String, Arc<Interface>>,
    healthy: AtomicBool,
    reconnect_lock: Mutex<()>,
}

impl<P: Provider> ConnectionManager<P> {
    pub fn new(
        settings: ConnectionSettings,
        connector: impl Connector<P>,
        builtin_interfaces: HashMap<String, Arc<Interface>>,
    ) -> Self {
        Self {
            settings,
            connector: Arc::new(connector),
            provider: RwLock::new(None),
            bindings: RwLock::new(HashMap::new()),
            contract_configs: RwLock::new(vec![]),
            builtin_interfaces,
            healthy: AtomicBool::new(false),
            reconnect_lock: Mutex::new(()),
        }
    }

    /// Contracts to bind on [`Self::reload_bindings`], including the reload
    /// that follows a reconnect when nothing is bound
    pub fn with_contract_configs(mut self, contracts: &[ContractConfig]) -> Self {
        *self.contract_configs.get_mut() = contracts.to_vec();

        self
    }

    /// Connects with a fixed delay between attempts. A chain identity
    /// mismatch fails immediately without retrying.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let attempts = self.settings.connect_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.establish().await {
                Ok(provider) => {
                    self.install(provider).await;
                    info!(url = %self.settings.json_rpc_url, attempt, "connected to RPC endpoint");

                    return Ok(());
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(attempt, attempts, %error, "RPC connection attempt failed");
                    last_error = error.to_string();

                    if attempt < attempts {
                        sleep(self.settings.connect_retry_delay).await;
                    }
                }
            }
        }

        Err(ConnectionError::Unreachable {
            attempts,
            reason: last_error,
        })
    }

    async fn establish(&self) -> Result<Arc<P>, ConnectionError> {
        let provider = self.connector.connect(&self.settings.json_rpc_url)?;

        provider.get_block_number().await?;

        let actual = provider.get_chain_id().await?.low_u64();
        let expected = self.settings.expected_chain_id;
        if actual != expected {
            return Err(ConnectionError::NetworkMismatch { expected, actual });
        }

        Ok(Arc::new(provider))
    }

    async fn install(&self, provider: Arc<P>) {
        *self.provider.write().await = Some(provider);
        self.healthy.store(true, Ordering::SeqCst);
    }

    /// Binds every usable contract. Entries that are inactive, lack an address
    /// or lack an interface descriptor are skipped with a warning.
    pub async fn load_bindings(&self, contracts: &[ContractConfig]) -> usize {
        *self.contract_configs.write().await = contracts.to_vec();

        let mut bindings = self.bindings.write().await;
        for contract in contracts {
            if let Some(binding) = self.bind(contract) {
                bindings.insert(binding.name.clone(), binding);
            }
        }

        info!(bound = bindings.len(), configured = contracts.len(), "loaded contract bindings");

        bindings.len()
    }

    /// Binds the configured contracts again
    pub async fn reload_bindings(&self) -> usize {
        let contracts = self.contract_configs.read().await.clone();

        self.load_bindings(&contracts).await
    }

    fn bind(&self, contract: &ContractConfig) -> Option<ContractBinding> {
        let name = &contract.name;

        if !contract.active {
            warn!(contract = %name, "skipping inactive contract");
            return None;
        }

        let Some(address) = contract.address.as_deref() else {
            warn!(contract = %name, "skipping contract without an address");
            return None;
        };
        let address = match address.parse::<Address>() {
            Ok(address) => address,
            Err(error) => {
                warn!(contract = %name, %address, %error, "skipping contract with invalid address");
                return None;
            }
        };

        let interface = match contract.load_interface() {
            Some(Ok(interface)) => Arc::new(interface),
            Some(Err(error)) => {
                warn!(contract = %name, %error, "skipping contract with unusable interface");
                return None;
            }
            None => match self.builtin_interfaces.get(name) {
                Some(interface) => interface.clone(),
                None => {
                    warn!(contract = %name, "skipping contract without an interface descriptor");
                    return None;
                }
            },
        };

        Some(ContractBinding {
            name: name.clone(),
            address,
            interface,
            active: contract.active,
        })
    }

    pub async fn get_contract(&self, name: &str) -> Option<ContractBinding> {
        self.bindings.read().await.get(name).cloned()
    }

    pub async fn get_provider(&self) -> Result<Arc<P>, ConnectionError> {
        self.provider.read().await.clone().ok_or(ConnectionError::Unavailable)
    }

    pub async fn current_block_height(&self) -> Result<u64, ConnectionError> {
        let provider = self.get_provider().await?;

        Ok(provider.get_block_number().await?.as_u64())
    }

    pub fn max_range_for_query(&self) -> u64 {
        self.settings.max_blocks_per_query
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn get_settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub(crate) async fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        *self.provider.write().await = None;
    }

    /// Single reconnect attempt. Serialized so concurrent health failures
    /// never race on the provider slot.
    pub(crate) async fn try_reconnect(&self) -> Result<(), ConnectionError> {
        let _guard = self.reconnect_lock.lock().await;

        if self.is_healthy() {
            return Ok(());
        }

        let provider = self.establish().await?;
        self.install(provider).await;

        if self.bindings.read().await.is_empty() {
            self.reload_bindings().await;
        }

        Ok(())
    }
}
