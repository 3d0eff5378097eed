use ethers::prelude::Middleware;
use ethers::providers::{Http, Provider as EthersProvider, ProviderError as EthersProviderError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Filter, Log, TransactionRequest, U256, U64};

pub type ProviderError = EthersProviderError;

/// The only surface through which the indexer reads the chain
#[async_trait::async_trait]
pub trait Provider: Clone + Sync + Send + 'static {
    async fn get_block_number(&self) -> Result<U64, ProviderError>;
    async fn get_chain_id(&self) -> Result<U256, ProviderError>;
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError>;
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError>;
}

#[async_trait::async_trait]
impl Provider for EthersProvider<Http> {
    async fn get_block_number(&self) -> Result<U64, ProviderError> {
        Middleware::get_block_number(self).await
    }

    async fn get_chain_id(&self) -> Result<U256, ProviderError> {
        Middleware::get_chainid(self).await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError> {
        Middleware::get_logs(self, filter).await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();

        Middleware::call(self, &tx, None).await
    }
}

/// Builds a provider for an RPC endpoint
pub trait Connector<P: Provider>: Send + Sync + 'static {
    fn connect(&self, json_rpc_url: &str) -> Result<P, ProviderError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HttpConnector;

impl Connector<EthersProvider<Http>> for HttpConnector {
    fn connect(&self, json_rpc_url: &str) -> Result<EthersProvider<Http>, ProviderError> {
        EthersProvider::<Http>::try_from(json_rpc_url)
            .map_err(|error| ProviderError::CustomError(error.to_string()))
    }
}

/// Object-safe view of a provider used for contract read calls
#[async_trait::async_trait]
pub trait ContractCaller: Sync + Send {
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError>;
}

#[async_trait::async_trait]
impl<P: Provider> ContractCaller for P {
    async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        Provider::call(self, to, data).await
    }
}
