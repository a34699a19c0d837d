//! Delegate staking balance and delegator balances at the snapshot block.

use crate::chain::{ChainQueryPort, TransportError};
use crate::compute::snapshot::SnapshotReference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Why a delegation state is (or is not) complete. Lets callers tell
/// "no delegators" apart from "lookups failed".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DelegationStatus {
    Complete,
    /// No snapshot could be resolved for the cycle.
    NoSnapshot,
    /// A lookup failed; balances were zeroed.
    Degraded { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationState {
    pub staking_balance: u64,
    pub delegators: BTreeMap<String, u64>,
    pub status: DelegationStatus,
}

impl DelegationState {
    fn empty(status: DelegationStatus) -> Self {
        Self {
            staking_balance: 0,
            delegators: BTreeMap::new(),
            status,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, DelegationStatus::Degraded { .. })
    }
}

/// Staking balance and per-delegator balances at `snapshot`.
///
/// Never fails: a missing snapshot yields an empty `NoSnapshot` state and any
/// transport failure yields an empty `Degraded` state carrying the reason.
pub async fn delegators_at(
    port: &dyn ChainQueryPort,
    snapshot: Option<&SnapshotReference>,
    delegate: &str,
) -> DelegationState {
    let Some(snapshot) = snapshot else {
        return DelegationState::empty(DelegationStatus::NoSnapshot);
    };
    match fetch_delegators(port, snapshot, delegate).await {
        Ok((staking_balance, delegators)) => DelegationState {
            staking_balance,
            delegators,
            status: DelegationStatus::Complete,
        },
        Err(e) => {
            warn!(
                backend = port.name(),
                cycle = snapshot.cycle,
                error = %e,
                "no delegators or unexpected error"
            );
            DelegationState::empty(DelegationStatus::Degraded {
                reason: e.to_string(),
            })
        }
    }
}

async fn fetch_delegators(
    port: &dyn ChainQueryPort,
    snapshot: &SnapshotReference,
    delegate: &str,
) -> Result<(u64, BTreeMap<String, u64>), TransportError> {
    let record = port.delegate_record(&snapshot.block, delegate).await?;
    let total = record.delegated_addresses.len();
    let mut delegators = BTreeMap::new();
    for (idx, address) in record.delegated_addresses.iter().enumerate() {
        let balance = port.contract_balance(&snapshot.block, address).await?;
        debug!(idx, total, %address, balance, "delegator info fetched");
        delegators.insert(address.clone(), balance);
    }
    Ok((record.staking_balance, delegators))
}
