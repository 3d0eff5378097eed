use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethers::types::Address;
use futures_util::future::join;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChildSource, Domain, FactorySource};
use crate::connection::ContractCaller;
use crate::contracts::{ContractHandle, Interface, InterfaceError};
use crate::events::{self, EventRecord};
use crate::projections::{self, enrich, ProjectionBuilder};

pub const LAUNCHPAD_NAME: &str = "Launchpad";
pub const MARKETPLACE_NAME: &str = "Marketplace";
pub const COLLECTION_NAME: &str = "Collection";

pub const LAUNCHPAD_ABI: &[&str] = &[
    "event CollectionCreated(address indexed collection, address indexed creator, string name, string symbol, uint256 maxSupply, uint256 mintPrice)",
    "event PlatformFeeUpdated(uint256 newFee)",
];

pub const MARKETPLACE_ABI: &[&str] = &[
    "event Listed(uint256 indexed listingId, address indexed seller, address indexed collection, uint256 tokenId, uint256 price)",
    "event Sale(uint256 indexed listingId, address indexed buyer, uint256 price)",
    "event ListingCancelled(uint256 indexed listingId)",
];

pub const COLLECTION_ABI: &[&str] = &[
    "event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)",
    "event Minted(address indexed to, uint256 indexed tokenId, uint256 price)",
    "function totalSupply() view returns (uint256)",
    "function owner() view returns (address)",
];

/// Prices are quoted in the native currency
const NATIVE_DECIMALS: u8 = 18;

pub fn launchpad_interface() -> Result<Interface, InterfaceError> {
    Ok(Interface::from_human_readable(LAUNCHPAD_NAME, LAUNCHPAD_ABI)?
        .with_scaled_params(&["mintPrice"], NATIVE_DECIMALS))
}

pub fn marketplace_interface() -> Result<Interface, InterfaceError> {
    Ok(Interface::from_human_readable(MARKETPLACE_NAME, MARKETPLACE_ABI)?
        .with_scaled_params(&["price"], NATIVE_DECIMALS))
}

pub fn collection_interface() -> Result<Interface, InterfaceError> {
    Ok(Interface::from_human_readable(COLLECTION_NAME, COLLECTION_ABI)?
        .with_scaled_params(&["price"], NATIVE_DECIMALS))
}

pub fn domain() -> Result<Domain, InterfaceError> {
    let collection_interface = collection_interface()?;

    Ok(Domain::new("collectibles")
        .add_factory(
            FactorySource::new(LAUNCHPAD_NAME, "collections", launchpad_interface()?)
                .with_creation_event("CollectionCreated", "collection")
                .with_event_names(&["PlatformFeeUpdated"]),
        )
        .add_factory(FactorySource::new(
            MARKETPLACE_NAME,
            "listings",
            marketplace_interface()?,
        ))
        .with_child(ChildSource::new(
            COLLECTION_NAME,
            "collection_activity",
            collection_interface.clone(),
        ))
        .with_projection(CollectionSnapshotBuilder {
            collection: Arc::new(collection_interface),
        }))
}

/// Current state of one launched collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionSnapshot {
    pub address: String,
    pub creator: Option<String>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub max_supply: Option<String>,
    pub mint_price: Option<String>,
    pub total_supply: Option<String>,
    pub owner: Option<String>,
    pub created_at_block: u64,
    pub created_in_transaction: String,
    pub updated_at: DateTime<Utc>,
}

pub struct CollectionSnapshotBuilder {
    collection: Arc<Interface>,
}

#[async_trait::async_trait]
impl ProjectionBuilder for CollectionSnapshotBuilder {
    fn get_child_triggers(&self) -> &[&'static str] {
        &["Minted"]
    }

    async fn build(
        &self,
        origin: &EventRecord,
        collection: Address,
        caller: &dyn ContractCaller,
    ) -> Value {
        let key = projections::get_projection_key(&collection);
        let created = |param: &str| origin.get_raw_string(param).map(str::to_string);

        let handle = ContractHandle::at(collection, self.collection.clone());
        let (total_supply, owner) =
            join(handle.read_one(caller, "totalSupply"), handle.read_one(caller, "owner")).await;

        let snapshot = CollectionSnapshot {
            total_supply: enrich(&key, "totalSupply", total_supply.and_then(projections::into_uint))
                .map(|total| total.to_string()),
            owner: enrich(&key, "owner", owner.and_then(projections::into_address))
                .map(|owner| events::address_to_string(&owner)),
            address: key,
            creator: created("creator"),
            name: created("name"),
            symbol: created("symbol"),
            max_supply: created("maxSupply"),
            mint_price: created("mintPrice"),
            created_at_block: origin.block_number,
            created_in_transaction: origin.transaction_hash.clone(),
            updated_at: Utc::now(),
        };

        serde_json::to_value(snapshot).unwrap_or(Value::Null)
    }
}
