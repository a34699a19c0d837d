//! Cycle → roll snapshot block resolution.

use crate::chain::{BlockRef, ChainQueryPort};
use crate::compute::RewardError;
use crate::network::NetworkParameters;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Block whose context holds the stake distribution for exactly one cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReference {
    pub cycle: i64,
    pub index: i64,
    pub block: BlockRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotResolution {
    Resolved(SnapshotReference),
    /// The cycle's snapshot lies beyond the current head; retry later.
    NotYetAvailable {
        snapshot_level: i64,
        current_level: i64,
    },
}

impl SnapshotResolution {
    pub fn reference(&self) -> Option<&SnapshotReference> {
        match self {
            SnapshotResolution::Resolved(r) => Some(r),
            SnapshotResolution::NotYetAvailable { .. } => None,
        }
    }
}

pub struct SnapshotResolver<'a> {
    params: &'a NetworkParameters,
}

impl<'a> SnapshotResolver<'a> {
    pub fn new(params: &'a NetworkParameters) -> Self {
        Self { params }
    }

    /// First level at which the cycle's snapshot can be known.
    pub fn snapshot_level(&self, cycle: i64) -> Option<i64> {
        let preserved = i64::from(self.params.preserved_cycles);
        cycle
            .checked_sub(preserved)?
            .checked_mul(i64::from(self.params.blocks_per_cycle))?
            .checked_add(1)
    }

    /// Level of the block recording the snapshot index for `cycle`.
    pub fn index_block_level(&self, cycle: i64) -> Option<i64> {
        self.params.first_level_of(cycle)
    }

    /// Level whose state reflects roll snapshot `index` chosen for `cycle`.
    pub fn snapshot_block_level(&self, cycle: i64, index: i64) -> Option<i64> {
        let preserved = i64::from(self.params.preserved_cycles);
        let cycle_start = cycle
            .checked_sub(preserved + 2)?
            .checked_mul(i64::from(self.params.blocks_per_cycle))?;
        let offset = index
            .checked_add(1)?
            .checked_mul(i64::from(self.params.blocks_per_roll_snapshot))?;
        cycle_start.checked_add(offset)
    }

    pub async fn resolve(
        &self,
        port: &dyn ChainQueryPort,
        cycle: i64,
        current_level: i64,
    ) -> Result<SnapshotResolution, RewardError> {
        if cycle < 0 {
            return Err(RewardError::cycle_out_of_range(cycle));
        }
        let snapshot_level = self
            .snapshot_level(cycle)
            .ok_or_else(|| RewardError::cycle_out_of_range(cycle))?;
        debug!(cycle, snapshot_level, "reward cycle snapshot level");

        if current_level < snapshot_level {
            info!(cycle, current_level, snapshot_level, "cycle too far in the future");
            return Ok(SnapshotResolution::NotYetAvailable {
                snapshot_level,
                current_level,
            });
        }

        let block_level = self
            .index_block_level(cycle)
            .ok_or_else(|| RewardError::cycle_out_of_range(cycle))?;
        let indices = port.roll_snapshot_indices(block_level, cycle).await?;
        let index = match indices.as_slice() {
            [index] => *index,
            _ => {
                error!(cycle, found = indices.len(), "too few or too many snapshots");
                return Err(RewardError::DataInconsistency {
                    cycle,
                    detail: format!(
                        "expected exactly one roll snapshot index at level {}, found {:?}",
                        block_level, indices
                    ),
                });
            }
        };
        if !(0..self.params.snapshots_per_cycle()).contains(&index) {
            return Err(RewardError::DataInconsistency {
                cycle,
                detail: format!(
                    "roll snapshot index {} outside 0..{}",
                    index,
                    self.params.snapshots_per_cycle()
                ),
            });
        }

        let level = self
            .snapshot_block_level(cycle, index)
            .ok_or_else(|| RewardError::cycle_out_of_range(cycle))?;
        if level < 1 {
            return Err(RewardError::DataInconsistency {
                cycle,
                detail: format!("snapshot block level {} precedes genesis", level),
            });
        }
        debug!(cycle, index, level, "snapshot block resolved");
        Ok(SnapshotResolution::Resolved(SnapshotReference {
            cycle,
            index,
            block: BlockRef::Level(level),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChain;

    fn mainnet() -> NetworkParameters {
        NetworkParameters::mainnet()
    }

    #[tokio::test]
    async fn resolves_mainnet_cycle_100() {
        let params = mainnet();
        let resolver = SnapshotResolver::new(&params);
        assert_eq!(resolver.snapshot_level(100), Some(95 * 4096 + 1));
        assert_eq!(resolver.index_block_level(100), Some(100 * 4096 + 1));

        let chain = InMemoryChain::new("node").with_snapshots(409601, 100, vec![3]);
        let res = resolver.resolve(&chain, 100, 450_000).await.unwrap();
        assert_eq!(
            res,
            SnapshotResolution::Resolved(SnapshotReference {
                cycle: 100,
                index: 3,
                block: BlockRef::Level(382976),
            })
        );
    }

    #[tokio::test]
    async fn future_cycle_not_yet_available_without_queries() {
        let params = mainnet();
        let resolver = SnapshotResolver::new(&params);
        let chain = InMemoryChain::new("node");
        let res = resolver.resolve(&chain, 200, 450_000).await.unwrap();
        assert!(matches!(res, SnapshotResolution::NotYetAvailable { .. }));
        assert!(res.reference().is_none());
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn boundary_level_is_available() {
        let params = mainnet();
        let resolver = SnapshotResolver::new(&params);
        let current = resolver.snapshot_level(100).unwrap();
        let chain = InMemoryChain::new("node").with_snapshots(409601, 100, vec![0]);
        let res = resolver.resolve(&chain, 100, current).await.unwrap();
        assert_eq!(
            res.reference().map(|r| r.block.clone()),
            Some(BlockRef::Level(93 * 4096 + 256))
        );
    }

    #[tokio::test]
    async fn zero_or_many_indices_is_inconsistent() {
        let params = mainnet();
        let resolver = SnapshotResolver::new(&params);
        for indices in [vec![], vec![3, 4]] {
            let chain = InMemoryChain::new("node").with_snapshots(409601, 100, indices);
            let err = resolver.resolve(&chain, 100, 450_000).await.unwrap_err();
            assert!(matches!(
                err,
                RewardError::DataInconsistency { cycle: 100, .. }
            ));
            assert_eq!(chain.calls(), vec!["snapshot 409601 100".to_string()]);
        }
    }

    #[tokio::test]
    async fn out_of_range_index_is_inconsistent() {
        let params = mainnet();
        let resolver = SnapshotResolver::new(&params);
        let chain = InMemoryChain::new("node").with_snapshots(409601, 100, vec![16]);
        let err = resolver.resolve(&chain, 100, 450_000).await.unwrap_err();
        assert!(matches!(err, RewardError::DataInconsistency { .. }));
    }

    #[tokio::test]
    async fn negative_or_huge_cycle_is_rejected_without_queries() {
        let params = mainnet();
        let resolver = SnapshotResolver::new(&params);
        let chain = InMemoryChain::new("node");
        for cycle in [-1, i64::MIN, i64::MAX] {
            let err = resolver.resolve(&chain, cycle, 450_000).await.unwrap_err();
            assert!(matches!(
                err,
                RewardError::DataInconsistency { cycle: c, .. } if c == cycle
            ));
        }
        assert!(chain.calls().is_empty());
    }
}
