//! Per-cycle reward record for one delegate against one backend.

use crate::chain::ChainQueryPort;
use crate::compute::delegation::{delegators_at, DelegationStatus};
use crate::compute::snapshot::{SnapshotResolution, SnapshotResolver};
use crate::compute::unfrozen::{RewardAggregator, RewardStatus};
use crate::compute::RewardError;
use crate::network::NetworkParameters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Rewards earned by a delegate in one cycle and the balances they are shared by.
/// Amounts are in mutez.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub cycle: i64,
    pub delegate_staking_balance: u64,
    pub total_reward_amount: u64,
    pub delegator_balances: BTreeMap<String, u64>,
    pub delegation: DelegationStatus,
    pub rewards: RewardStatus,
}

impl RewardRecord {
    pub fn delegator_count(&self) -> usize {
        self.delegator_balances.len()
    }

    /// Fraction of the staking balance held by `address` at the snapshot.
    pub fn delegator_share(&self, address: &str) -> Option<f64> {
        if self.delegate_staking_balance == 0 {
            return None;
        }
        self.delegator_balances
            .get(address)
            .map(|b| *b as f64 / self.delegate_staking_balance as f64)
    }
}

/// Composes snapshot resolution, delegation lookup and reward aggregation
/// against a single [`ChainQueryPort`].
#[derive(Clone)]
pub struct RewardCalculator {
    params: Arc<NetworkParameters>,
    port: Arc<dyn ChainQueryPort>,
    delegate: String,
}

impl RewardCalculator {
    pub fn new(
        params: Arc<NetworkParameters>,
        port: Arc<dyn ChainQueryPort>,
        delegate: impl Into<String>,
    ) -> Self {
        Self {
            params,
            port,
            delegate: delegate.into(),
        }
    }

    pub fn backend(&self) -> &str {
        self.port.name()
    }

    pub async fn resolve_snapshot(
        &self,
        cycle: i64,
        current_level: i64,
    ) -> Result<SnapshotResolution, RewardError> {
        SnapshotResolver::new(&self.params)
            .resolve(self.port.as_ref(), cycle, current_level)
            .await
    }

    /// Compute the record for `cycle` from the current head.
    pub async fn rewards_for_cycle(&self, cycle: i64) -> Result<RewardRecord, RewardError> {
        let head = self.port.head().await?;
        debug!(
            backend = self.backend(),
            level = head.level,
            cycle = head.cycle,
            "current head"
        );

        let resolution = self.resolve_snapshot(cycle, head.level).await?;
        let delegation =
            delegators_at(self.port.as_ref(), resolution.reference(), &self.delegate).await;

        let (total_reward_amount, rewards) = RewardAggregator::new(&self.params)
            .total_for_cycle(self.port.as_ref(), &self.delegate, cycle, head.level)
            .await?;

        let record = RewardRecord {
            cycle,
            delegate_staking_balance: delegation.staking_balance,
            total_reward_amount,
            delegator_balances: delegation.delegators,
            delegation: delegation.status,
            rewards,
        };
        debug!(
            backend = self.backend(),
            cycle,
            staking_balance = record.delegate_staking_balance,
            total_rewards = record.total_reward_amount,
            delegators = record.delegator_count(),
            "reward record computed"
        );
        Ok(record)
    }

    pub async fn delegator_count(
        &self,
        cycle: i64,
        current_level: i64,
    ) -> Result<usize, RewardError> {
        let resolution = self.resolve_snapshot(cycle, current_level).await?;
        let state =
            delegators_at(self.port.as_ref(), resolution.reference(), &self.delegate).await;
        Ok(state.delegators.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BalanceUpdateEntry, BlockMetadata, BlockRef, DelegateRecord, InMemoryChain};

    fn params() -> Arc<NetworkParameters> {
        Arc::new(NetworkParameters::mainnet())
    }

    fn full_chain(head_level: i64) -> InMemoryChain {
        InMemoryChain::new("node")
            .with_head(head_level, head_level / 4096)
            .with_snapshots(409601, 100, vec![3])
            .with_delegate(
                BlockRef::Level(382976),
                "tz1b",
                DelegateRecord {
                    staking_balance: 1_000,
                    delegated_addresses: vec!["KT1a".into()],
                },
            )
            .with_balance(BlockRef::Level(382976), "KT1a", 400)
            .with_metadata(
                106 * 4096,
                BlockMetadata {
                    balance_updates: vec![BalanceUpdateEntry {
                        kind: "freezer".into(),
                        delegate: Some("tz1b".into()),
                        category: Some("rewards".into()),
                        change: -77,
                    }],
                },
            )
    }

    #[tokio::test]
    async fn queries_in_documented_order() {
        let chain = Arc::new(full_chain(450_000));
        let calc = RewardCalculator::new(params(), chain.clone(), "tz1b");
        let record = calc.rewards_for_cycle(100).await.unwrap();
        assert_eq!(record.delegate_staking_balance, 1_000);
        assert_eq!(record.total_reward_amount, 77);
        assert_eq!(record.delegator_share("KT1a"), Some(0.4));
        assert_eq!(
            chain.calls(),
            vec![
                "head".to_string(),
                "snapshot 409601 100".to_string(),
                "delegate 382976 tz1b".to_string(),
                "balance 382976 KT1a".to_string(),
                format!("metadata {}", 106 * 4096),
            ]
        );
    }

    #[tokio::test]
    async fn future_cycle_yields_empty_record() {
        let chain = Arc::new(full_chain(450_000));
        let calc = RewardCalculator::new(params(), chain.clone(), "tz1b");
        let record = calc.rewards_for_cycle(200).await.unwrap();
        assert_eq!(record.delegate_staking_balance, 0);
        assert!(record.delegator_balances.is_empty());
        assert_eq!(record.total_reward_amount, 0);
        assert_eq!(record.delegation, DelegationStatus::NoSnapshot);
        assert!(matches!(record.rewards, RewardStatus::Pending { .. }));
        assert_eq!(chain.calls(), vec!["head".to_string()]);
    }

    #[tokio::test]
    async fn counts_delegators() {
        let chain = Arc::new(full_chain(450_000));
        let calc = RewardCalculator::new(params(), chain, "tz1b");
        assert_eq!(calc.delegator_count(100, 450_000).await.unwrap(), 1);
        assert_eq!(calc.delegator_count(200, 450_000).await.unwrap(), 0);
    }
}
