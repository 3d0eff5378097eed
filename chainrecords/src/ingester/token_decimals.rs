use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::Address;

use crate::connection::ContractCaller;
use crate::contracts::{ContractHandle, Interface};
use crate::domains::ChildSource;
use crate::events::{self, EventRecord};
use crate::projections::{enrich, into_decimals};

/// `decimals()` of every token seen so far. Only successful reads are kept,
/// so a failed read is retried the next time the token shows up.
#[derive(Debug, Clone, Default)]
pub struct TokenDecimals {
    decimals: HashMap<Address, u8>,
}

impl TokenDecimals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &Address) -> Option<u8> {
        self.decimals.get(token).copied()
    }

    pub async fn resolve(
        &mut self,
        token: Address,
        erc20: &Arc<Interface>,
        caller: &dyn ContractCaller,
    ) -> Option<u8> {
        if let Some(decimals) = self.get(&token) {
            return Some(decimals);
        }

        let key = events::address_to_string(&token);
        let handle = ContractHandle::at(token, erc20.clone());
        let read = handle.read_one(caller, "decimals").await.and_then(into_decimals);
        let decimals = enrich(&key, "token decimals", read)?;

        self.decimals.insert(token, decimals);

        Some(decimals)
    }

    /// Display decimals for the token amounts of one child, keyed by param
    pub async fn resolve_for_child(
        &mut self,
        child: &ChildSource,
        origin: &EventRecord,
        caller: &dyn ContractCaller,
    ) -> HashMap<String, u8> {
        let mut display_decimals = HashMap::new();

        let Some(erc20) = child.erc20.as_ref() else {
            return display_decimals;
        };

        for amount in child.token_amounts.iter() {
            let token = origin
                .get_raw_string(&amount.token_param)
                .and_then(|address| address.parse::<Address>().ok());

            if let Some(token) = token {
                if let Some(decimals) = self.resolve(token, erc20, caller).await {
                    display_decimals.insert(amount.param.clone(), decimals);
                }
            }
        }

        display_decimals
    }
}
