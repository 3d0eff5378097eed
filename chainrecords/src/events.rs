mod display;
mod record;

pub use record::{DedupKey, EventRecord};

use std::collections::HashMap;

use ethers::abi::{RawLog, Token};
use ethers::types::Log;
use serde_json::{Map, Value};

use crate::contracts::Interface;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic,
    #[error("topic {0:?} does not belong to interface {1}")]
    UnknownTopic(ethers::types::H256, String),
    #[error("cannot decode {event}: {reason}")]
    Abi { event: String, reason: String },
    #[error("log is missing {0} (pending logs are not indexed)")]
    Pending(&'static str),
}

/// Turns a raw log into a normalized record.
///
/// Big numbers are stringified in `raw_arguments`; `display_arguments` is a
/// presentation-only rendering derived from it.
pub fn normalize(
    log: &Log,
    interface: &Interface,
    contract_name: &str,
) -> Result<EventRecord, DecodeError> {
    normalize_with_decimals(log, interface, contract_name, &HashMap::new())
}

/// Same as [`normalize`], with per-param display decimals taking precedence
/// over the interface's own, e.g. the decimals of the token an amount is in.
pub fn normalize_with_decimals(
    log: &Log,
    interface: &Interface,
    contract_name: &str,
    display_decimals: &HashMap<String, u8>,
) -> Result<EventRecord, DecodeError> {
    let topic = log.topics.first().ok_or(DecodeError::MissingTopic)?;
    let event = interface
        .get_event_by_topic(topic)
        .ok_or_else(|| DecodeError::UnknownTopic(*topic, interface.name.clone()))?;

    let parsed = event
        .parse_log(RawLog::from(log.clone()))
        .map_err(|error| DecodeError::Abi {
            event: event.name.clone(),
            reason: error.to_string(),
        })?;

    let mut raw_arguments = Map::new();
    let mut display_arguments = Map::new();
    for param in parsed.params {
        display_arguments.insert(
            param.name.clone(),
            display::render(
                &param.value,
                display_decimals
                    .get(&param.name)
                    .copied()
                    .or_else(|| interface.get_decimals_for(&param.name)),
            ),
        );
        raw_arguments.insert(param.name, token_to_value(&param.value));
    }

    Ok(EventRecord {
        event_name: event.name.clone(),
        contract_name: contract_name.to_string(),
        contract_address: address_to_string(&log.address),
        block_number: log.block_number.ok_or(DecodeError::Pending("block number"))?.as_u64(),
        transaction_hash: format!(
            "{:#x}",
            log.transaction_hash.ok_or(DecodeError::Pending("transaction hash"))?
        ),
        log_index: log.log_index.ok_or(DecodeError::Pending("log index"))?.as_u64(),
        raw_arguments,
        display_arguments,
        recorded_at: chrono::Utc::now(),
    })
}

pub fn address_to_string(address: &ethers::types::Address) -> String {
    format!("{:#x}", address)
}

/// Lossless JSON form of an ABI token
pub fn token_to_value(token: &Token) -> Value {
    match token {
        Token::Address(address) => Value::String(address_to_string(address)),
        Token::Uint(value) => Value::String(value.to_string()),
        Token::Int(value) => Value::String(ethers::types::I256::from_raw(*value).to_string()),
        Token::Bool(value) => Value::Bool(*value),
        Token::String(value) => Value::String(value.clone()),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => {
            Value::String(format!("0x{}", ethers::utils::hex::encode(bytes)))
        }
        Token::Array(tokens) | Token::FixedArray(tokens) | Token::Tuple(tokens) => {
            Value::Array(tokens.iter().map(token_to_value).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use ethers::abi::{encode, Token};
    use ethers::types::{Address, Bytes, H256, U256};

    use super::*;

    fn staking_interface() -> Interface {
        Interface::from_human_readable(
            "StakingPool",
            &["event Staked(address indexed user, uint256 amount, int256 delta)"],
        )
        .unwrap()
        .with_scaled_params(&["amount"], 18)
    }

    fn staked_log(interface: &Interface) -> Log {
        let event = interface.get_event("Staked").unwrap();
        let user = Address::from_str("0x7dfd6013cf8d92b751e63d481b51fe0e4c5abf5e").unwrap();

        Log {
            address: Address::from_str("0x1111111111111111111111111111111111111111").unwrap(),
            topics: vec![event.signature(), H256::from(user)],
            data: Bytes::from(encode(&[
                Token::Uint(U256::from_dec_str("1500000000000000000").unwrap()),
                Token::Int(ethers::types::I256::from_dec_str("-5").unwrap().into_raw()),
            ])),
            block_number: Some(151.into()),
            transaction_hash: Some(H256::repeat_byte(0xab)),
            log_index: Some(1.into()),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_a_log_into_a_record() {
        let interface = staking_interface();
        let record = normalize(&staked_log(&interface), &interface, "StakingPool").unwrap();

        assert_eq!(record.event_name, "Staked");
        assert_eq!(record.contract_name, "StakingPool");
        assert_eq!(record.contract_address, "0x1111111111111111111111111111111111111111");
        assert_eq!(record.block_number, 151);
        assert_eq!(record.log_index, 1);
        assert_eq!(record.raw_arguments["amount"], "1500000000000000000");
        assert_eq!(record.raw_arguments["delta"], "-5");
        assert_eq!(
            record.raw_arguments["user"],
            "0x7dfd6013cf8d92b751e63d481b51fe0e4c5abf5e"
        );
        assert_eq!(record.display_arguments["amount"], "1.5");
        assert_eq!(record.display_arguments["user"], "0x7dfd...bf5e");
    }

    #[test]
    fn prefers_resolved_decimals_for_display() {
        let interface = staking_interface();
        let decimals = HashMap::from([("amount".to_string(), 6)]);

        let record =
            normalize_with_decimals(&staked_log(&interface), &interface, "StakingPool", &decimals)
                .unwrap();

        assert_eq!(record.raw_arguments["amount"], "1500000000000000000");
        assert_eq!(record.display_arguments["amount"], "1500000000000");
    }

    #[test]
    fn rejects_logs_from_other_interfaces() {
        let interface = staking_interface();
        let mut log = staked_log(&interface);
        log.topics[0] = H256::repeat_byte(0x01);

        assert!(matches!(
            normalize(&log, &interface, "StakingPool"),
            Err(DecodeError::UnknownTopic(..))
        ));
    }

    #[test]
    fn rejects_pending_logs() {
        let interface = staking_interface();
        let mut log = staked_log(&interface);
        log.block_number = None;

        assert!(matches!(
            normalize(&log, &interface, "StakingPool"),
            Err(DecodeError::Pending(_))
        ));
    }
}
