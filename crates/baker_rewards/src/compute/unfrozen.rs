//! Unfrozen rewards and fees from freezer balance updates.

use crate::chain::{BalanceUpdateEntry, ChainQueryPort};
use crate::compute::RewardError;
use crate::network::NetworkParameters;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const FREEZER: &str = "freezer";
const REWARDS: &str = "rewards";
const FEES: &str = "fees";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnfrozenBreakdown {
    pub rewards: i64,
    pub fees: i64,
}

impl UnfrozenBreakdown {
    pub fn total(&self) -> i64 {
        self.rewards.saturating_add(self.fees)
    }
}

/// Sum unfrozen rewards and fees for `delegate`. Freezer entries record the
/// outflow from the frozen pool as negative changes, hence the negation.
pub fn unfrozen_breakdown(updates: &[BalanceUpdateEntry], delegate: &str) -> UnfrozenBreakdown {
    let mut out = UnfrozenBreakdown::default();
    for update in updates {
        if update.kind != FREEZER || update.delegate.as_deref() != Some(delegate) {
            continue;
        }
        match update.category.as_deref() {
            Some(REWARDS) => {
                out.rewards = out.rewards.saturating_sub(update.change);
                debug!(change = update.change, "freezer rewards update");
            }
            Some(FEES) => {
                out.fees = out.fees.saturating_sub(update.change);
                debug!(change = update.change, "freezer fees update");
            }
            other => debug!(category = ?other, "freezer update not included"),
        }
    }
    out
}

pub fn unfrozen_amount(updates: &[BalanceUpdateEntry], delegate: &str) -> i64 {
    unfrozen_breakdown(updates, delegate).total()
}

/// Outcome of looking up a cycle's reward total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RewardStatus {
    /// Rewards were read from the unfreeze block.
    Unfrozen { level: i64 },
    /// Unfreeze block not reached yet; the total is provisionally zero.
    Pending { unfreeze_level: i64 },
}

pub struct RewardAggregator<'a> {
    params: &'a NetworkParameters,
}

impl<'a> RewardAggregator<'a> {
    pub fn new(params: &'a NetworkParameters) -> Self {
        Self { params }
    }

    /// Total unfrozen reward + fees for `cycle`, or a provisional zero when the
    /// unfreeze level is still ahead of `current_level`.
    pub async fn total_for_cycle(
        &self,
        port: &dyn ChainQueryPort,
        delegate: &str,
        cycle: i64,
        current_level: i64,
    ) -> Result<(u64, RewardStatus), RewardError> {
        if cycle < 0 {
            return Err(RewardError::cycle_out_of_range(cycle));
        }
        let unfreeze_level = self
            .params
            .unfreeze_level(cycle)
            .ok_or_else(|| RewardError::cycle_out_of_range(cycle))?;
        debug!(
            cycle,
            preserved_cycles = self.params.preserved_cycles,
            blocks_per_cycle = self.params.blocks_per_cycle,
            unfreeze_level,
            "unfreeze level"
        );
        if current_level < unfreeze_level {
            warn!(cycle, unfreeze_level, "rewards and fees not unfrozen yet");
            return Ok((0, RewardStatus::Pending { unfreeze_level }));
        }

        let metadata = port.block_metadata(unfreeze_level).await?;
        let total = unfrozen_amount(&metadata.balance_updates, delegate);
        let total = u64::try_from(total).map_err(|_| RewardError::DataInconsistency {
            cycle,
            detail: format!(
                "negative unfrozen amount {} at level {}",
                total, unfreeze_level
            ),
        })?;
        Ok((
            total,
            RewardStatus::Unfrozen {
                level: unfreeze_level,
            },
        ))
    }
}
