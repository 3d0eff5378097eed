use ethers::abi::Token;
use ethers::types::{Address, I256, U256};
use serde_json::Value;

use super::{address_to_string, token_to_value};

const SHORT_HEX_THRESHOLD: usize = 10;

/// Presentation form of a token. Never used for correctness decisions.
pub fn render(token: &Token, decimals: Option<u8>) -> Value {
    match token {
        Token::Address(address) => Value::String(truncate_address(address)),
        Token::Uint(value) => match decimals {
            Some(decimals) => Value::String(scale(*value, decimals)),
            None => Value::String(value.to_string()),
        },
        Token::Int(value) => {
            let value = I256::from_raw(*value);

            match decimals {
                Some(decimals) => {
                    let sign = if value.is_negative() { "-" } else { "" };

                    Value::String(format!("{sign}{}", scale(value.unsigned_abs(), decimals)))
                }
                None => Value::String(value.to_string()),
            }
        }
        Token::Bytes(bytes) | Token::FixedBytes(bytes) if bytes.len() > SHORT_HEX_THRESHOLD => {
            let hex = ethers::utils::hex::encode(bytes);

            Value::String(format!("0x{}...{}", &hex[..8], &hex[hex.len() - 8..]))
        }
        Token::Array(tokens) | Token::FixedArray(tokens) | Token::Tuple(tokens) => {
            Value::Array(tokens.iter().map(|token| render(token, decimals)).collect())
        }
        other => token_to_value(other),
    }
}

pub fn truncate_address(address: &Address) -> String {
    let full = address_to_string(address);

    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// `value / 10^decimals` without trailing zeros
pub fn scale(value: U256, decimals: u8) -> String {
    let scaled = ethers::utils::format_units(value, decimals as u32)
        .unwrap_or_else(|_| value.to_string());

    if scaled.contains('.') {
        scaled.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        scaled
    }
}
