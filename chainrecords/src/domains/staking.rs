use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use futures_util::future::join;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChildSource, Domain, FactorySource};
use crate::connection::ContractCaller;
use crate::contracts::{ContractHandle, Interface, InterfaceError};
use crate::events::EventRecord;
use crate::projections::{self, enrich, ProjectionBuilder, TokenMetadata};

pub const FACTORY_NAME: &str = "StakingFactory";
pub const POOL_NAME: &str = "StakingPool";

pub const FACTORY_ABI: &[&str] = &[
    "event PoolCreated(address indexed pool, address indexed stakingToken, address indexed rewardToken, uint256 rewardRate, uint256 startTime, uint256 endTime)",
    "event PoolFeeUpdated(uint256 oldFee, uint256 newFee)",
    "event OwnershipTransferred(address indexed previousOwner, address indexed newOwner)",
    "function owner() view returns (address)",
];

pub const POOL_ABI: &[&str] = &[
    "event Staked(address indexed user, uint256 amount)",
    "event Withdrawn(address indexed user, uint256 amount)",
    "event RewardPaid(address indexed user, uint256 reward)",
    "event RewardRateUpdated(uint256 newRate)",
    "function totalStaked() view returns (uint256)",
    "function rewardRate() view returns (uint256)",
];

/// Display decimals for amounts whose token does not answer `decimals()`
const FALLBACK_TOKEN_DECIMALS: u8 = 18;

pub fn factory_interface() -> Result<Interface, InterfaceError> {
    Interface::from_human_readable(FACTORY_NAME, FACTORY_ABI)
}

pub fn pool_interface() -> Result<Interface, InterfaceError> {
    Ok(Interface::from_human_readable(POOL_NAME, POOL_ABI)?
        .with_scaled_params(&["amount", "reward"], FALLBACK_TOKEN_DECIMALS))
}

pub fn domain() -> Result<Domain, InterfaceError> {
    let pool_interface = pool_interface()?;

    Ok(Domain::new("staking")
        .add_factory(
            FactorySource::new(FACTORY_NAME, "staking", factory_interface()?)
                .with_creation_event("PoolCreated", "pool")
                .with_event_names(&["PoolFeeUpdated", "OwnershipTransferred"]),
        )
        .with_child(
            ChildSource::new(POOL_NAME, "staking_pools", pool_interface.clone()).with_token_amounts(
                projections::erc20_interface()?,
                &[("amount", "stakingToken"), ("reward", "rewardToken")],
            ),
        )
        .with_projection(PoolSnapshotBuilder {
            pool: Arc::new(pool_interface),
            erc20: Arc::new(projections::erc20_interface()?),
        }))
}

/// Current state of one staking pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSnapshot {
    pub address: String,
    pub staking_token: TokenMetadata,
    pub reward_token: TokenMetadata,
    pub reward_rate: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_staked: Option<String>,
    pub created_at_block: u64,
    pub created_in_transaction: String,
    pub updated_at: DateTime<Utc>,
}

pub struct PoolSnapshotBuilder {
    pool: Arc<Interface>,
    erc20: Arc<Interface>,
}

#[async_trait::async_trait]
impl ProjectionBuilder for PoolSnapshotBuilder {
    fn get_child_triggers(&self) -> &[&'static str] {
        &["Staked", "Withdrawn", "RewardRateUpdated"]
    }

    async fn build(&self, origin: &EventRecord, pool: Address, caller: &dyn ContractCaller) -> Value {
        let key = projections::get_projection_key(&pool);
        let token_at = |param: &str| {
            origin.get_raw_string(param).and_then(|address| address.parse::<Address>().ok())
        };

        let (staking_token, reward_token) = join(
            fetch_token(&key, token_at("stakingToken"), &self.erc20, caller),
            fetch_token(&key, token_at("rewardToken"), &self.erc20, caller),
        )
        .await;

        let handle = ContractHandle::at(pool, self.pool.clone());
        let (total_staked, reward_rate) =
            join(handle.read_one(caller, "totalStaked"), handle.read_one(caller, "rewardRate"))
                .await;

        let total_staked = enrich(&key, "totalStaked", total_staked.and_then(projections::into_uint));
        // The creation value stands in until the pool answers
        let reward_rate = enrich(&key, "rewardRate", reward_rate.and_then(projections::into_uint))
            .map(|rate| rate.to_string())
            .or_else(|| origin.get_raw_string("rewardRate").map(str::to_string));

        let snapshot = PoolSnapshot {
            address: key,
            staking_token,
            reward_token,
            reward_rate,
            start_time: origin.get_raw_string("startTime").map(str::to_string),
            end_time: origin.get_raw_string("endTime").map(str::to_string),
            total_staked: total_staked.map(|total| total.to_string()),
            created_at_block: origin.block_number,
            created_in_transaction: origin.transaction_hash.clone(),
            updated_at: Utc::now(),
        };

        serde_json::to_value(snapshot).unwrap_or(Value::Null)
    }
}

async fn fetch_token(
    key: &str,
    token: Option<Address>,
    erc20: &Arc<Interface>,
    caller: &dyn ContractCaller,
) -> TokenMetadata {
    match token {
        Some(token) => TokenMetadata::fetch(key, token, erc20, caller).await,
        None => TokenMetadata::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_amounts_are_scaled_for_display() {
        let interface = pool_interface().unwrap();

        assert_eq!(interface.get_decimals_for("amount"), Some(18));
        assert_eq!(interface.get_decimals_for("reward"), Some(18));
        assert_eq!(interface.get_decimals_for("newRate"), None);
    }

    #[test]
    fn pool_amounts_follow_their_tokens() {
        let domain = domain().unwrap();
        let pool = domain.child.as_ref().unwrap();

        assert!(pool.erc20.is_some());
        assert_eq!(pool.token_amounts.len(), 2);
        assert_eq!(pool.token_amounts[0].param, "amount");
        assert_eq!(pool.token_amounts[0].token_param, "stakingToken");
        assert_eq!(pool.token_amounts[1].token_param, "rewardToken");
    }

    #[test]
    fn creation_event_names_the_pool_param() {
        let domain = domain().unwrap();
        let creation = domain.factories[0].creation.as_ref().unwrap();

        assert_eq!(creation.event_name, "PoolCreated");
        assert_eq!(creation.child_param, "pool");
        assert!(factory_interface().unwrap().get_event("PoolCreated").is_some());
    }
}
