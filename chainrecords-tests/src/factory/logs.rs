use chainrecords::Interface;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, Log, H256};

pub fn random_tx_hash() -> H256 {
    H256::from(rand::random::<[u8; 32]>())
}

/// Builds a log the way a node would return it for `event_name`
pub struct LogBuilder {
    address: Address,
    topics: Vec<H256>,
    data: Vec<Token>,
    block_number: u64,
    log_index: u64,
    transaction_hash: H256,
}

pub fn event_log(interface: &Interface, event_name: &str, address: Address) -> LogBuilder {
    let event = interface.get_event(event_name).unwrap();

    LogBuilder {
        address,
        topics: vec![event.signature()],
        data: vec![],
        block_number: 1,
        log_index: 0,
        transaction_hash: random_tx_hash(),
    }
}

impl LogBuilder {
    pub fn indexed(mut self, token: Token) -> Self {
        self.topics.push(H256::from_slice(&encode(&[token])));

        self
    }

    pub fn data(mut self, tokens: Vec<Token>) -> Self {
        self.data = tokens;

        self
    }

    pub fn at(mut self, block_number: u64, log_index: u64) -> Self {
        self.block_number = block_number;
        self.log_index = log_index;

        self
    }

    pub fn in_transaction(mut self, transaction_hash: H256) -> Self {
        self.transaction_hash = transaction_hash;

        self
    }

    pub fn build(self) -> Log {
        Log {
            address: self.address,
            topics: self.topics,
            data: Bytes::from(encode(&self.data)),
            block_number: Some(self.block_number.into()),
            transaction_hash: Some(self.transaction_hash),
            log_index: Some(self.log_index.into()),
            removed: Some(false),
            ..Default::default()
        }
    }
}
