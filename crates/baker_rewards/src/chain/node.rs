//! Direct node backend: Tezos shell RPC on a (preferably archive) node.

use crate::chain::fetch::{Caching, Fetcher};
use crate::chain::normalize::{amount_at, parse_signed, signed_at, strings_at};
use crate::chain::port::{
    balance_updates_from, BlockMetadata, BlockRef, ChainQueryPort, DelegateRecord, Head,
    TransportError,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const ARCHIVE_HINT: &str = "node request failed; historical context needs an archive node";

pub fn head_path() -> String {
    "/chains/main/blocks/head".to_string()
}

pub fn delegate_path(block: &BlockRef, delegate: &str) -> String {
    format!(
        "/chains/main/blocks/{}/context/delegates/{}",
        block,
        urlencoding::encode(delegate)
    )
}

pub fn contract_path(block: &BlockRef, address: &str) -> String {
    format!(
        "/chains/main/blocks/{}/context/contracts/{}",
        block,
        urlencoding::encode(address)
    )
}

pub fn snapshot_path(block_level: i64, cycle: i64) -> String {
    format!(
        "/chains/main/blocks/{}/context/raw/json/rolls/owner/snapshot/{}/",
        block_level, cycle
    )
}

pub fn metadata_path(block_level: i64) -> String {
    format!("/chains/main/blocks/{}/metadata", block_level)
}

pub fn parse_head(v: &Value) -> Result<Head, TransportError> {
    Ok(Head {
        level: signed_at(v, "metadata/level/level")?,
        cycle: signed_at(v, "metadata/level/cycle")?,
    })
}

pub fn parse_delegate(v: &Value) -> Result<DelegateRecord, TransportError> {
    Ok(DelegateRecord {
        staking_balance: amount_at(v, "staking_balance")?,
        delegated_addresses: strings_at(v, "delegated_contracts")?,
    })
}

pub fn parse_contract_balance(v: &Value) -> Result<u64, TransportError> {
    amount_at(v, "balance").map_err(Into::into)
}

pub fn parse_snapshot_indices(v: &Value) -> Result<Vec<i64>, TransportError> {
    let items = v
        .as_array()
        .ok_or_else(|| TransportError::Decode(format!("snapshot list expected, got {}", v)))?;
    items
        .iter()
        .map(|i| parse_signed("snapshot", i).map_err(Into::into))
        .collect()
}

/// Block metadata balance updates. Entries other than freezer updates that
/// don't decode (e.g. contract updates in an unfamiliar shape) are skipped.
pub fn parse_metadata(v: &Value) -> Result<BlockMetadata, TransportError> {
    let updates = v
        .get("balance_updates")
        .and_then(Value::as_array)
        .ok_or_else(|| TransportError::Decode("metadata without balance_updates".into()))?;
    Ok(BlockMetadata {
        balance_updates: balance_updates_from(updates)?,
    })
}

pub struct NodeRpc {
    base_url: String,
    fetcher: Arc<Fetcher>,
}

impl NodeRpc {
    pub fn new(base_url: String, fetcher: Arc<Fetcher>) -> Self {
        Self { base_url, fetcher }
    }

    async fn get(&self, path: &str, caching: Caching) -> Result<Value, TransportError> {
        self.fetcher
            .get_json(&self.base_url, path, caching)
            .await
            .map_err(|e| e.context(ARCHIVE_HINT))
    }
}

#[async_trait]
impl ChainQueryPort for NodeRpc {
    fn name(&self) -> &str {
        "node"
    }

    async fn head(&self) -> Result<Head, TransportError> {
        let v = self.get(&head_path(), Caching::Live).await?;
        parse_head(&v)
    }

    async fn delegate_record(
        &self,
        block: &BlockRef,
        delegate: &str,
    ) -> Result<DelegateRecord, TransportError> {
        let v = self
            .get(&delegate_path(block, delegate), Caching::Pinned)
            .await?;
        parse_delegate(&v)
    }

    async fn contract_balance(
        &self,
        block: &BlockRef,
        address: &str,
    ) -> Result<u64, TransportError> {
        let v = self
            .get(&contract_path(block, address), Caching::Pinned)
            .await?;
        parse_contract_balance(&v)
    }

    async fn roll_snapshot_indices(
        &self,
        block_level: i64,
        cycle: i64,
    ) -> Result<Vec<i64>, TransportError> {
        let v = self
            .get(&snapshot_path(block_level, cycle), Caching::Pinned)
            .await?;
        parse_snapshot_indices(&v)
    }

    async fn block_metadata(&self, block_level: i64) -> Result<BlockMetadata, TransportError> {
        let v = self
            .get(&metadata_path(block_level), Caching::Pinned)
            .await?;
        parse_metadata(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths() {
        assert_eq!(
            snapshot_path(409601, 100),
            "/chains/main/blocks/409601/context/raw/json/rolls/owner/snapshot/100/"
        );
        assert_eq!(
            delegate_path(&BlockRef::Level(382976), "tz1baker"),
            "/chains/main/blocks/382976/context/delegates/tz1baker"
        );
        assert_eq!(metadata_path(434176), "/chains/main/blocks/434176/metadata");
    }

    #[test]
    fn metadata_skips_contract_updates() {
        let v = json!({"balance_updates": [
            {"kind": "contract", "contract": "tz1x", "change": "-5"},
            {"kind": "freezer", "category": "rewards", "delegate": "tz1b", "level": 94, "change": "-1000"},
            {"weird": true}
        ]});
        let meta = parse_metadata(&v).unwrap();
        assert_eq!(meta.balance_updates.len(), 2);
        assert_eq!(meta.balance_updates[1].change, -1000);
        assert_eq!(meta.balance_updates[0].delegate, None);
    }

    #[test]
    fn metadata_rejects_unreadable_freezer_update() {
        let v = json!({"balance_updates": [
            {"kind": "freezer", "category": "rewards", "delegate": "tz1b", "level": 94, "change": "-1000"},
            {"kind": "freezer", "category": "fees", "delegate": "tz1b", "level": 94, "change": "-5O"}
        ]});
        assert!(matches!(parse_metadata(&v), Err(TransportError::Decode(_))));
    }

    #[test]
    fn snapshot_indices() {
        assert_eq!(parse_snapshot_indices(&json!([3])).unwrap(), vec![3]);
        assert!(parse_snapshot_indices(&json!({"x": 1})).is_err());
    }
}
