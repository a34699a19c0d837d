//! Mirror/indexer backend reached through a set of interchangeable mirrors.
//!
//! Endpoints (relative to a mirror base URL):
//! - `/v3/head` → `{ "level", "cycle" }`
//! - `/v3/delegate/{pkh}?block={block}` → `{ "staking_balance", "delegators": [..] }`
//! - `/v3/balance/{address}?block={block}` → `{ "balance" }`
//! - `/v3/roll_snapshots/{cycle}?block={level}` → `[index]`
//! - `/v3/balance_updates/{level}` → `[{ "kind", "delegate", "category", "change" }]`

use crate::chain::fetch::{Caching, Fetcher};
use crate::chain::normalize::{amount_at, parse_signed, signed_at, strings_at};
use crate::chain::port::{
    balance_updates_from, BlockMetadata, BlockRef, ChainQueryPort, DelegateRecord, Head,
    TransportError,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Ordered list of mirrors that answered the head probe at startup.
/// Built once and shared read-only by every mirror-backed port.
#[derive(Clone, Debug)]
pub struct MirrorSelector {
    mirrors: Vec<String>,
}

impl MirrorSelector {
    /// Probe each candidate's head endpoint; keep responsive ones in order.
    pub async fn initialize(
        candidates: &[String],
        fetcher: &Fetcher,
    ) -> Result<Self, TransportError> {
        let mut mirrors = Vec::new();
        for base in candidates {
            match fetcher.get_json(base, &head_path(), Caching::Live).await {
                Ok(v) => match parse_head(&v) {
                    Ok(head) => {
                        info!(mirror = %base, level = head.level, "mirror available");
                        mirrors.push(base.clone());
                    }
                    Err(e) => warn!(mirror = %base, error = %e, "mirror head unreadable"),
                },
                Err(e) => warn!(mirror = %base, error = %e, "mirror unreachable"),
            }
        }
        Self::from_healthy(mirrors)
    }

    /// Trust the given mirrors without probing (offline mode, tests).
    pub fn from_healthy(mirrors: Vec<String>) -> Result<Self, TransportError> {
        if mirrors.is_empty() {
            return Err(TransportError::NoMirror);
        }
        Ok(Self { mirrors })
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }
}

pub fn head_path() -> String {
    "/v3/head".to_string()
}

pub fn delegate_path(block: &BlockRef, delegate: &str) -> String {
    format!(
        "/v3/delegate/{}?block={}",
        urlencoding::encode(delegate),
        block
    )
}

pub fn balance_path(block: &BlockRef, address: &str) -> String {
    format!(
        "/v3/balance/{}?block={}",
        urlencoding::encode(address),
        block
    )
}

pub fn snapshot_path(block_level: i64, cycle: i64) -> String {
    format!("/v3/roll_snapshots/{}?block={}", cycle, block_level)
}

pub fn balance_updates_path(block_level: i64) -> String {
    format!("/v3/balance_updates/{}", block_level)
}

pub fn parse_head(v: &Value) -> Result<Head, TransportError> {
    Ok(Head {
        level: signed_at(v, "level")?,
        cycle: signed_at(v, "cycle")?,
    })
}

pub fn parse_delegate(v: &Value) -> Result<DelegateRecord, TransportError> {
    Ok(DelegateRecord {
        staking_balance: amount_at(v, "staking_balance")?,
        delegated_addresses: strings_at(v, "delegators")?,
    })
}

pub fn parse_balance(v: &Value) -> Result<u64, TransportError> {
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

/// Same rule as the node backend: unreadable freezer entries fail the block,
/// other unreadable entries are skipped.
pub fn parse_balance_updates(v: &Value) -> Result<BlockMetadata, TransportError> {
    let items = v.as_array().ok_or_else(|| {
        TransportError::Decode(format!("balance update list expected, got {}", v))
    })?;
    Ok(BlockMetadata {
        balance_updates: balance_updates_from(items)?,
    })
}

pub struct MirrorApi {
    selector: Arc<MirrorSelector>,
    fetcher: Arc<Fetcher>,
}

impl MirrorApi {
    pub fn new(selector: Arc<MirrorSelector>, fetcher: Arc<Fetcher>) -> Self {
        Self { selector, fetcher }
    }

    /// Try mirrors in order; the first answer wins.
    async fn get(&self, path: &str, caching: Caching) -> Result<Value, TransportError> {
        let mut last_err = None;
        for base in self.selector.mirrors() {
            match self.fetcher.get_json(base, path, caching).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    warn!(mirror = %base, %path, error = %e, "mirror request failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(TransportError::NoMirror))
    }
}

#[async_trait]
impl ChainQueryPort for MirrorApi {
    fn name(&self) -> &str {
        "mirror"
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
            .get(&balance_path(block, address), Caching::Pinned)
            .await?;
        parse_balance(&v)
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
            .get(&balance_updates_path(block_level), Caching::Pinned)
            .await?;
        parse_balance_updates(&v)
    }
}
