//! Chain query capability shared by the node and mirror backends.

use crate::chain::cache::CacheError;
use crate::chain::normalize::NormalizeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("cache: {0}")]
    Cache(#[from] CacheError),
    #[error("normalize: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("api error: status {0} body {1}")]
    Api(u16, String),
    #[error("offline mode: no cached data for key")]
    OfflineMiss,
    #[error("decode: {0}")]
    Decode(String),
    #[error("no responsive mirror")]
    NoMirror,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<TransportError>,
    },
}

impl TransportError {
    /// Wrap with a human hint, keeping the original error as source.
    pub fn context(self, context: impl Into<String>) -> Self {
        TransportError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Block identifier accepted by context queries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockRef {
    Level(i64),
    Hash(String),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Level(level) => write!(f, "{}", level),
            BlockRef::Hash(hash) => f.write_str(hash),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub level: i64,
    pub cycle: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateRecord {
    pub staking_balance: u64,
    pub delegated_addresses: Vec<String>,
}

/// One ledger event from block metadata. Only `kind == "freezer"` entries
/// matter for reward accounting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdateEntry {
    pub kind: String,
    #[serde(default)]
    pub delegate: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(deserialize_with = "crate::chain::normalize::de_signed_amount")]
    pub change: i64,
}

const FREEZER: &str = "freezer";

/// Decode a list of raw balance updates. Freezer entries must decode or the
/// whole list is rejected; anything else that does not decode is skipped.
pub(crate) fn balance_updates_from(
    items: &[Value],
) -> Result<Vec<BalanceUpdateEntry>, TransportError> {
    let mut out = Vec::with_capacity(items.len());
    for raw in items {
        let is_freezer = raw.get("kind").and_then(Value::as_str) == Some(FREEZER);
        match serde_json::from_value::<BalanceUpdateEntry>(raw.clone()) {
            Ok(entry) => out.push(entry),
            Err(e) if is_freezer => {
                return Err(TransportError::Decode(format!(
                    "freezer balance update {}: {}",
                    raw, e
                )));
            }
            Err(e) => debug!(error = %e, update = %raw, "skipping balance update"),
        }
    }
    Ok(out)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub balance_updates: Vec<BalanceUpdateEntry>,
}

/// "Ask the chain for X at block Y". Implementations must not keep
/// per-computation state; callers await each query in order.
#[async_trait]
pub trait ChainQueryPort: Send + Sync {
    /// Short backend label used in logs and cross-validation errors.
    fn name(&self) -> &str;

    async fn head(&self) -> Result<Head, TransportError>;

    async fn delegate_record(
        &self,
        block: &BlockRef,
        delegate: &str,
    ) -> Result<DelegateRecord, TransportError>;

    async fn contract_balance(&self, block: &BlockRef, address: &str)
        -> Result<u64, TransportError>;

    async fn roll_snapshot_indices(
        &self,
        block_level: i64,
        cycle: i64,
    ) -> Result<Vec<i64>, TransportError>;

    async fn block_metadata(&self, block_level: i64) -> Result<BlockMetadata, TransportError>;
}
