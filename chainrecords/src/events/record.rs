use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One on-chain event, normalized. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    pub event_name: String,
    pub contract_name: String,
    pub contract_address: String,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u64,
    pub raw_arguments: Map<String, Value>,
    pub display_arguments: Map<String, Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Identifies one on-chain event. A transaction may emit several events of
/// the same name, so the log index is part of the key; the block number is not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub transaction_hash: String,
    pub event_name: String,
    pub log_index: u64,
}

impl EventRecord {
    pub fn get_dedup_key(&self) -> DedupKey {
        DedupKey {
            transaction_hash: self.transaction_hash.to_lowercase(),
            event_name: self.event_name.clone(),
            log_index: self.log_index,
        }
    }

    pub fn get_position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    pub fn get_raw_argument(&self, name: &str) -> Option<&Value> {
        self.raw_arguments.get(name)
    }

    pub fn get_raw_string(&self, name: &str) -> Option<&str> {
        self.get_raw_argument(name).and_then(|value| value.as_str())
    }

    /// Equality match on a top-level field or, failing that, a raw argument
    pub fn matches(&self, field: &str, expected: &str) -> bool {
        let matches_ignoring_case = |actual: &str| actual.eq_ignore_ascii_case(expected);

        match field {
            "event_name" => self.event_name == expected,
            "contract_name" => self.contract_name == expected,
            "contract_address" => matches_ignoring_case(&self.contract_address),
            "transaction_hash" => matches_ignoring_case(&self.transaction_hash),
            "block_number" => self.block_number.to_string() == expected,
            "log_index" => self.log_index.to_string() == expected,
            argument => match self.raw_arguments.get(argument) {
                Some(Value::String(actual)) => matches_ignoring_case(actual),
                Some(Value::Bool(actual)) => actual.to_string() == expected,
                Some(other) => other.to_string() == expected,
                None => false,
            },
        }
    }
}
