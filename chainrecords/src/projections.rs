use std::sync::Arc;

use ethers::abi::Token;
use ethers::types::Address;
use futures_util::future::join3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::connection::ContractCaller;
use crate::contracts::{ContractHandle, ContractReadError, Interface, InterfaceError};
use crate::events::{self, EventRecord};

/// An auxiliary read for a projection failed. The projection is still
/// written, with the affected field left empty.
#[derive(Debug, thiserror::Error)]
#[error("cannot enrich {field} of {key}: {source}")]
pub struct EnrichmentError {
    pub key: String,
    pub field: &'static str,
    pub source: ContractReadError,
}

/// Builds the current-state snapshot of a child contract from the event
/// that created it plus fresh on-chain reads
#[async_trait::async_trait]
pub trait ProjectionBuilder: Send + Sync {
    /// Child events after which the snapshot is rebuilt
    fn get_child_triggers(&self) -> &[&'static str];

    async fn build(&self, origin: &EventRecord, child: Address, caller: &dyn ContractCaller) -> Value;
}

pub fn get_projection_key(child: &Address) -> String {
    events::address_to_string(child)
}

/// Logs enrichment failures and keeps whatever was read
pub fn enrich<T>(key: &str, field: &'static str, result: Result<T, ContractReadError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(source) => {
            let error = EnrichmentError {
                key: key.to_string(),
                field,
                source,
            };
            warn!(%error, "projection enrichment failed");

            None
        }
    }
}

/// The slice of ERC20 read by every token enrichment
pub fn erc20_interface() -> Result<Interface, InterfaceError> {
    Interface::from_human_readable(
        "ERC20",
        &[
            "function name() view returns (string)",
            "function symbol() view returns (string)",
            "function decimals() view returns (uint8)",
        ],
    )
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenMetadata {
    pub address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

impl TokenMetadata {
    pub async fn fetch(
        key: &str,
        token: Address,
        erc20: &Arc<Interface>,
        caller: &dyn ContractCaller,
    ) -> Self {
        let handle = ContractHandle::at(token, erc20.clone());

        let (name, symbol, decimals) = join3(
            handle.read_one(caller, "name"),
            handle.read_one(caller, "symbol"),
            handle.read_one(caller, "decimals"),
        )
        .await;

        Self {
            address: events::address_to_string(&token),
            name: enrich(key, "token name", name.and_then(into_string)),
            symbol: enrich(key, "token symbol", symbol.and_then(into_string)),
            decimals: enrich(key, "token decimals", decimals.and_then(into_decimals)),
        }
    }
}

pub fn into_string(token: Token) -> Result<String, ContractReadError> {
    token.into_string().ok_or_else(|| unexpected_type("string"))
}

pub fn into_uint(token: Token) -> Result<ethers::types::U256, ContractReadError> {
    token.into_uint().ok_or_else(|| unexpected_type("uint"))
}

/// ERC20 `decimals()` answers that do not fit a `uint8` are rejected
pub fn into_decimals(token: Token) -> Result<u8, ContractReadError> {
    let value = into_uint(token)?;

    u8::try_from(value).map_err(|_| ContractReadError::Decode {
        function: "decimals".to_string(),
        reason: format!("{value} is out of range for uint8"),
    })
}

pub fn into_address(token: Token) -> Result<Address, ContractReadError> {
    token.into_address().ok_or_else(|| unexpected_type("address"))
}

fn unexpected_type(expected: &str) -> ContractReadError {
    ContractReadError::Decode {
        function: expected.to_string(),
        reason: format!("expected a {expected} output"),
    }
}
