//! In-memory [`ChainQueryPort`] for tests and dry runs.
//!
//! Serves canned data, records every call in order, and can be told to fail
//! specific lookups.

use crate::chain::port::{
    BlockMetadata, BlockRef, ChainQueryPort, DelegateRecord, Head, TransportError,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryChain {
    label: String,
    head: Option<Head>,
    delegates: HashMap<(BlockRef, String), DelegateRecord>,
    balances: HashMap<(BlockRef, String), u64>,
    snapshots: HashMap<(i64, i64), Vec<i64>>,
    metadata: HashMap<i64, BlockMetadata>,
    failing_balances: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryChain {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_head(mut self, level: i64, cycle: i64) -> Self {
        self.head = Some(Head { level, cycle });
        self
    }

    pub fn with_delegate(
        mut self,
        block: BlockRef,
        delegate: &str,
        record: DelegateRecord,
    ) -> Self {
        self.delegates.insert((block, delegate.to_string()), record);
        self
    }

    pub fn with_balance(mut self, block: BlockRef, address: &str, balance: u64) -> Self {
        self.balances.insert((block, address.to_string()), balance);
        self
    }

    pub fn with_snapshots(mut self, block_level: i64, cycle: i64, indices: Vec<i64>) -> Self {
        self.snapshots.insert((block_level, cycle), indices);
        self
    }

    pub fn with_metadata(mut self, block_level: i64, metadata: BlockMetadata) -> Self {
        self.metadata.insert(block_level, metadata);
        self
    }

    /// Balance lookups for `address` fail with a transport error.
    pub fn failing_balance(mut self, address: &str) -> Self {
        self.failing_balances.insert(address.to_string());
        self
    }

    /// Calls seen so far, e.g. `["head", "snapshot 409601 100"]`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    fn missing(what: String) -> TransportError {
        TransportError::Api(404, what)
    }
}

#[async_trait]
impl ChainQueryPort for InMemoryChain {
    fn name(&self) -> &str {
        &self.label
    }

    async fn head(&self) -> Result<Head, TransportError> {
        self.record("head".to_string());
        self.head.ok_or_else(|| Self::missing("head".to_string()))
    }

    async fn delegate_record(
        &self,
        block: &BlockRef,
        delegate: &str,
    ) -> Result<DelegateRecord, TransportError> {
        self.record(format!("delegate {} {}", block, delegate));
        self.delegates
            .get(&(block.clone(), delegate.to_string()))
            .cloned()
            .ok_or_else(|| Self::missing(format!("delegate {} at {}", delegate, block)))
    }

    async fn contract_balance(
        &self,
        block: &BlockRef,
        address: &str,
    ) -> Result<u64, TransportError> {
        self.record(format!("balance {} {}", block, address));
        if self.failing_balances.contains(address) {
            return Err(TransportError::Api(503, format!("balance {}", address)));
        }
        self.balances
            .get(&(block.clone(), address.to_string()))
            .copied()
            .ok_or_else(|| Self::missing(format!("balance {} at {}", address, block)))
    }

    async fn roll_snapshot_indices(
        &self,
        block_level: i64,
        cycle: i64,
    ) -> Result<Vec<i64>, TransportError> {
        self.record(format!("snapshot {} {}", block_level, cycle));
        self.snapshots
            .get(&(block_level, cycle))
            .cloned()
            .ok_or_else(|| Self::missing(format!("snapshot {} {}", block_level, cycle)))
    }

    async fn block_metadata(&self, block_level: i64) -> Result<BlockMetadata, TransportError> {
        self.record(format!("metadata {}", block_level));
        self.metadata
            .get(&block_level)
            .cloned()
            .ok_or_else(|| Self::missing(format!("metadata {}", block_level)))
    }
}
