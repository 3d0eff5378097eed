use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chainrecords::connection::{Provider, ProviderError};
use chainrecords::Interface;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, Filter, Log, ValueOrArray, H256, U256, U64};

/// A log query as the provider received it
#[derive(Clone, Debug, PartialEq)]
pub struct QueriedFilter {
    pub addresses: Vec<Address>,
    pub topics: Vec<H256>,
    pub from: u64,
    pub to: u64,
}

#[derive(Default)]
struct Chain {
    block_number: u64,
    chain_id: u64,
    unreachable: bool,
    logs: Vec<Log>,
    failing_ranges: Vec<(u64, u64)>,
    reads: HashMap<(Address, [u8; 4]), Bytes>,
    queried_filters: Vec<QueriedFilter>,
}

/// In-memory chain. Clones share state so tests can keep steering a provider
/// the indexer already holds.
#[derive(Clone)]
pub struct StubProvider {
    chain: Arc<Mutex<Chain>>,
}

impl StubProvider {
    pub fn new(chain_id: u64, block_number: u64) -> Self {
        Self {
            chain: Arc::new(Mutex::new(Chain {
                chain_id,
                block_number,
                ..Default::default()
            })),
        }
    }

    fn chain(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap()
    }

    pub fn with_logs(self, logs: Vec<Log>) -> Self {
        self.chain().logs.extend(logs);

        self
    }

    pub fn add_logs(&self, logs: Vec<Log>) {
        self.chain().logs.extend(logs);
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.chain().block_number = block_number;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.chain().unreachable = unreachable;
    }

    /// Log queries overlapping `[from, to]` fail
    pub fn fail_range(&self, from: u64, to: u64) {
        self.chain().failing_ranges.push((from, to));
    }

    pub fn heal_ranges(&self) {
        self.chain().failing_ranges.clear();
    }

    /// Answers calls to `function` on `address` with `outputs`. Unstubbed
    /// calls revert.
    pub fn stub_read(&self, address: Address, interface: &Interface, function: &str, outputs: &[Token]) {
        let selector = interface.get_function(function).unwrap().short_signature();

        self.chain()
            .reads
            .insert((address, selector), Bytes::from(ethers::abi::encode(outputs)));
    }

    pub fn get_queried_filters(&self) -> Vec<QueriedFilter> {
        self.chain().queried_filters.clone()
    }

    pub fn clear_queried_filters(&self) {
        self.chain().queried_filters.clear();
    }

    fn check_reachable(&self) -> Result<(), ProviderError> {
        if self.chain().unreachable {
            Err(ProviderError::CustomError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Provider for StubProvider {
    async fn get_block_number(&self) -> Result<U64, ProviderError> {
        self.check_reachable()?;

        Ok(U64::from(self.chain().block_number))
    }

    async fn get_chain_id(&self) -> Result<U256, ProviderError> {
        self.check_reachable()?;

        Ok(U256::from(self.chain().chain_id))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ProviderError> {
        self.check_reachable()?;

        let queried = to_queried_filter(filter);
        let mut chain = self.chain();
        chain.queried_filters.push(queried.clone());

        let fails = chain
            .failing_ranges
            .iter()
            .any(|(from, to)| queried.from <= *to && *from <= queried.to);
        if fails {
            return Err(ProviderError::CustomError(format!(
                "query over [{}, {}] timed out",
                queried.from, queried.to
            )));
        }

        Ok(chain
            .logs
            .iter()
            .filter(|log| {
                let block_number = log.block_number.unwrap_or_default().as_u64();

                queried.addresses.contains(&log.address)
                    && log.topics.first().is_some_and(|topic| queried.topics.contains(topic))
                    && (queried.from..=queried.to).contains(&block_number)
            })
            .cloned()
            .collect())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        self.check_reachable()?;

        let mut selector = [0_u8; 4];
        selector.copy_from_slice(&data[..4]);

        self.chain()
            .reads
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| ProviderError::CustomError("execution reverted".to_string()))
    }
}

fn to_queried_filter(filter: &Filter) -> QueriedFilter {
    let addresses = match &filter.address {
        Some(ValueOrArray::Value(address)) => vec![*address],
        Some(ValueOrArray::Array(addresses)) => addresses.clone(),
        None => vec![],
    };

    let topics = match &filter.topics[0] {
        Some(ValueOrArray::Value(topic)) => topic.iter().copied().collect(),
        Some(ValueOrArray::Array(topics)) => topics.iter().flatten().copied().collect(),
        None => vec![],
    };

    QueriedFilter {
        addresses,
        topics,
        from: filter.get_from_block().unwrap_or_default().as_u64(),
        to: filter.get_to_block().unwrap_or_default().as_u64(),
    }
}
