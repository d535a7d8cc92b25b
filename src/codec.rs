//! Big-integer wire codec.
//!
//! Upstream payloads carry token amounts as tagged objects of the form
//! `{"type": "BigNumber", "hex": "0x..."}`. This module rewrites those tags
//! into exact `U256` values before the payload is turned into typed models,
//! and provides the serde adapters the models use for their amount fields.

use crate::models::Vault;
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Tag value marking a big-integer node.
pub const BIG_NUMBER_TAG: &str = "BigNumber";

/// Errors raised while decoding big-integer values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("big-number tag without a hex payload")]
    MissingHex,

    #[error("invalid big-number digits {input:?}: {reason}")]
    InvalidDigits { input: String, reason: String },

    #[error("unsupported big-number representation: {0}")]
    Unsupported(String),

    #[error("value {0} does not fit in 64 bits")]
    Overflow(U256),

    #[error("payload does not match the vault schema: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Whether a JSON node is a tagged big-integer.
pub fn is_tagged(value: &Value) -> bool {
    value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|tag| tag == BIG_NUMBER_TAG)
}

/// Encode a value as the wire tag.
pub fn encode(value: U256) -> Value {
    let mut tag = Map::new();
    tag.insert("type".to_string(), Value::String(BIG_NUMBER_TAG.to_string()));
    tag.insert("hex".to_string(), Value::String(format!("0x{value:x}")));
    Value::Object(tag)
}

/// Decode any accepted amount representation.
///
/// Accepts a wire tag, a `0x`-prefixed hex string, a decimal string or a
/// non-negative JSON integer.
pub fn decode(value: &Value) -> Result<U256, CodecError> {
    match value {
        Value::Object(map) if is_tagged(value) => {
            let hex = map
                .get("hex")
                .or_else(|| map.get("_hex"))
                .and_then(Value::as_str)
                .ok_or(CodecError::MissingHex)?;
            parse_hex(hex)
        }
        Value::String(text) => parse_str(text),
        Value::Number(number) => number
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| CodecError::Unsupported(number.to_string())),
        other => Err(CodecError::Unsupported(other.to_string())),
    }
}

fn parse_str(text: &str) -> Result<U256, CodecError> {
    let text = text.trim();
    if text.starts_with("0x") || text.starts_with("0X") {
        parse_hex(text)
    } else {
        parse_digits(text, 10)
    }
}

fn parse_hex(text: &str) -> Result<U256, CodecError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| CodecError::InvalidDigits {
            input: text.to_string(),
            reason: "missing 0x prefix".to_string(),
        })?;
    parse_digits(digits, 16)
}

fn parse_digits(digits: &str, radix: u64) -> Result<U256, CodecError> {
    if digits.is_empty() {
        return Err(CodecError::InvalidDigits {
            input: digits.to_string(),
            reason: "empty".to_string(),
        });
    }
    U256::from_str_radix(&digits.to_ascii_lowercase(), radix).map_err(|e| CodecError::InvalidDigits {
        input: digits.to_string(),
        reason: e.to_string(),
    })
}

/// Narrow a decoded value to `u64`.
pub fn to_u64(value: U256) -> Result<u64, CodecError> {
    if value.bit_len() > 64 {
        return Err(CodecError::Overflow(value));
    }
    Ok(value.as_limbs()[0])
}

/// Scale a raw amount by `decimals` into a float of whole units.
pub fn to_units(value: U256, decimals: u32) -> f64 {
    let raw: f64 = value.to_string().parse().unwrap_or(0.0);
    raw / 10f64.powi(decimals as i32)
}

/// Replace every big-integer tag in `value` with its decimal string form.
///
/// Non-tagged nodes are returned unchanged. A malformed tag fails the
/// whole pass.
pub fn normalize(value: Value) -> Result<Value, CodecError> {
    match value {
        Value::Object(_) if is_tagged(&value) => Ok(Value::String(decode(&value)?.to_string())),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key, normalize(child)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .into_iter()
            .map(normalize)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        leaf => Ok(leaf),
    }
}

/// Normalize a raw vault list and deserialize it into models.
///
/// A `null` payload is treated as an empty list. Strategies get their
/// owning vault's address filled in when the payload omits it.
pub fn revive_vaults(raw: Value) -> Result<Vec<Vault>, CodecError> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let mut vaults: Vec<Vault> = serde_json::from_value(normalize(raw)?)?;
    for vault in &mut vaults {
        for strategy in &mut vault.strategies {
            if strategy.vault.is_empty() {
                strategy.vault = vault.address.clone();
            }
        }
    }
    Ok(vaults)
}

/// Serde adapter for `U256` amounts: written as the wire tag, read from any
/// representation `decode` accepts.
pub mod big_uint {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        encode(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decode(&value).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for second-resolution timestamps that may arrive tagged,
/// as strings, or as plain integers.
pub mod timestamp {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            return Ok(0);
        }
        decode(&value)
            .and_then(to_u64)
            .map_err(serde::de::Error::custom)
    }
}
