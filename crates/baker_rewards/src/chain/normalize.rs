//! Normalization of amounts and levels as reported by nodes and indexers.
//!
//! Tezos RPC encodes mutez as decimal strings; some indexers send plain JSON
//! numbers. Both are accepted everywhere.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("missing field: {0}")]
    Missing(String),
    #[error("invalid amount for {field}: {value}")]
    InvalidAmount { field: String, value: String },
}

/// Parse a signed integer from a decimal string or JSON number.
pub fn parse_signed(field: &str, value: &Value) -> Result<i64, NormalizeError> {
    let invalid = || NormalizeError::InvalidAmount {
        field: field.to_string(),
        value: value.to_string(),
    };
    match value {
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        Value::Number(n) => n.as_i64().ok_or_else(invalid),
        Value::Null => Err(NormalizeError::Missing(field.to_string())),
        _ => Err(invalid()),
    }
}

/// Parse a non-negative amount (mutez) from a decimal string or JSON number.
pub fn parse_amount(field: &str, value: &Value) -> Result<u64, NormalizeError> {
    let signed = parse_signed(field, value)?;
    u64::try_from(signed).map_err(|_| NormalizeError::InvalidAmount {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Look up `path` (slash separated) inside `root` and parse it as a signed integer.
pub fn signed_at(root: &Value, path: &str) -> Result<i64, NormalizeError> {
    let pointer = format!("/{}", path);
    let value = root
        .pointer(&pointer)
        .ok_or_else(|| NormalizeError::Missing(path.to_string()))?;
    parse_signed(path, value)
}

/// Look up `path` inside `root` and parse it as a non-negative amount.
pub fn amount_at(root: &Value, path: &str) -> Result<u64, NormalizeError> {
    let pointer = format!("/{}", path);
    let value = root
        .pointer(&pointer)
        .ok_or_else(|| NormalizeError::Missing(path.to_string()))?;
    parse_amount(path, value)
}

/// Collect a list of string addresses at `path`.
pub fn strings_at(root: &Value, path: &str) -> Result<Vec<String>, NormalizeError> {
    let pointer = format!("/{}", path);
    match root.pointer(&pointer) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| NormalizeError::InvalidAmount {
                        field: path.to_string(),
                        value: v.to_string(),
                    })
            })
            .collect(),
        Some(Value::Null) | None => Err(NormalizeError::Missing(path.to_string())),
        Some(other) => Err(NormalizeError::InvalidAmount {
            field: path.to_string(),
            value: other.to_string(),
        }),
    }
}

/// serde adapter for `change` fields in balance updates.
pub fn de_signed_amount<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_signed("change", &value).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount_from_string_and_number() {
        assert_eq!(parse_amount("balance", &json!("12345")).unwrap(), 12345);
        assert_eq!(parse_amount("balance", &json!(12345)).unwrap(), 12345);
    }

    #[test]
    fn negative_amount_rejected() {
        let err = parse_amount("balance", &json!("-1")).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidAmount { .. }));
        assert_eq!(parse_signed("change", &json!("-1000")).unwrap(), -1000);
    }

    #[test]
    fn nested_lookup() {
        let head = json!({"metadata": {"level": {"level": 450000, "cycle": 109}}});
        assert_eq!(signed_at(&head, "metadata/level/level").unwrap(), 450000);
        assert_eq!(
            signed_at(&head, "metadata/level/missing").unwrap_err(),
            NormalizeError::Missing("metadata/level/missing".into())
        );
    }

    #[test]
    fn address_list() {
        let v = json!({"delegated_contracts": ["KT1a", "tz1b"]});
        assert_eq!(
            strings_at(&v, "delegated_contracts").unwrap(),
            vec!["KT1a".to_string(), "tz1b".to_string()]
        );
        assert!(strings_at(&v, "delegators").is_err());
    }
}
