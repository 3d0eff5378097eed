use chainrecords::EventRecord;
use serde_json::{json, Map};

use super::random_tx_hash;

pub fn event_record(event_name: &str, block_number: u64, log_index: u64) -> EventRecord {
    event_record_in_transaction(
        &format!("{:#x}", random_tx_hash()),
        event_name,
        block_number,
        log_index,
    )
}

pub fn event_record_in_transaction(
    transaction_hash: &str,
    event_name: &str,
    block_number: u64,
    log_index: u64,
) -> EventRecord {
    let mut raw_arguments = Map::new();
    raw_arguments.insert("amount".to_string(), json!("1000"));
    raw_arguments.insert(
        "user".to_string(),
        json!("0x7dfd6013cf8d92b751e63d481b51fe0e4c5abf5e"),
    );

    EventRecord {
        event_name: event_name.to_string(),
        contract_name: "StakingPool".to_string(),
        contract_address: "0x1111111111111111111111111111111111111111".to_string(),
        block_number,
        transaction_hash: transaction_hash.to_string(),
        log_index,
        raw_arguments: raw_arguments.clone(),
        display_arguments: raw_arguments,
        recorded_at: chrono::Utc::now(),
    }
}

