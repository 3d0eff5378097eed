/// Represents the network ID for an EVM Chain
/// For example, `ChainId::Mainnet`, `ChainId::Polygon`, etc.
pub type ChainId = ethers::types::Chain;

/// The EVM network whose contracts are being indexed
#[derive(Clone, Debug)]
pub struct Chain {
    pub id: ChainId,
    pub json_rpc_url: String,
}

impl Chain {
    /// Builds the chain network
    ///
    ///
    /// # Example
    /// ```
    /// use chainrecords::{Chain, ChainId};
    ///
    /// Chain::new(ChainId::Sepolia, "https://eth-sepolia.g.alchemy.com/v2/...");
    /// ```
    pub fn new(id: ChainId, json_rpc_url: &str) -> Self {
        Self {
            id,
            json_rpc_url: json_rpc_url.to_string(),
        }
    }

    pub fn id_as_u64(&self) -> u64 {
        self.id as u64
    }
}
