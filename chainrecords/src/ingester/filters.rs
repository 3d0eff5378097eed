use ethers::types::{Address, Filter as EthersFilter};

use super::chunks::BlockRange;
use crate::contracts::ContractEventTopic;

/// One log query: a contract, the event kinds wanted from it and a block range
#[derive(Clone, Debug)]
pub struct Filter {
    pub address: Address,
    pub range: BlockRange,
    pub value: EthersFilter,
}

impl Filter {
    /// None when there is nothing to ask for
    pub fn maybe_new(
        address: Address,
        topics: &[ContractEventTopic],
        range: BlockRange,
    ) -> Option<Filter> {
        if topics.is_empty() {
            return None;
        }

        Some(Filter {
            address,
            range,
            value: EthersFilter::new()
                .address(address)
                .topic0(topics.to_vec())
                .from_block(range.from)
                .to_block(range.to),
        })
    }
}

pub fn get_for_addresses(
    addresses: &[Address],
    topics: &[ContractEventTopic],
    range: BlockRange,
) -> Vec<Filter> {
    addresses
        .iter()
        .filter_map(|address| Filter::maybe_new(*address, topics, range))
        .collect()
}
