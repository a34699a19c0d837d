//! Cross-validation of reward records computed from two independent backends.

use crate::compute::{RewardCalculator, RewardError, RewardRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    StakingBalance,
    DelegatorCount,
    DelegatorBalances,
    TotalRewards,
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordField::StakingBalance => "delegate staking balance",
            RecordField::DelegatorCount => "delegator count",
            RecordField::DelegatorBalances => "delegator balances",
            RecordField::TotalRewards => "total rewards",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "cycle {cycle}: {field} differs between {primary_backend} ({primary}) and {reference_backend} ({reference})"
)]
pub struct CrossValidationError {
    pub cycle: i64,
    pub field: RecordField,
    pub primary_backend: String,
    pub primary: String,
    pub reference_backend: String,
    pub reference: String,
}

/// First address whose balance differs, rendered as `addr=balance` per side.
fn first_balance_difference(
    primary: &BTreeMap<String, u64>,
    reference: &BTreeMap<String, u64>,
) -> Option<(String, String)> {
    let render = |addr: &str, v: Option<&u64>| match v {
        Some(b) => format!("{}={}", addr, b),
        None => format!("{} missing", addr),
    };
    primary
        .keys()
        .chain(reference.keys())
        .find(|addr| primary.get(*addr) != reference.get(*addr))
        .map(|addr| {
            (
                render(addr.as_str(), primary.get(addr)),
                render(addr.as_str(), reference.get(addr)),
            )
        })
}

/// Field-by-field comparison in a fixed order; the first mismatch is reported.
pub fn compare_records(
    primary_backend: &str,
    primary: &RewardRecord,
    reference_backend: &str,
    reference: &RewardRecord,
) -> Result<(), CrossValidationError> {
    let mismatch = |field, p: String, r: String| CrossValidationError {
        cycle: primary.cycle,
        field,
        primary_backend: primary_backend.to_string(),
        primary: p,
        reference_backend: reference_backend.to_string(),
        reference: r,
    };

    if primary.delegate_staking_balance != reference.delegate_staking_balance {
        return Err(mismatch(
            RecordField::StakingBalance,
            primary.delegate_staking_balance.to_string(),
            reference.delegate_staking_balance.to_string(),
        ));
    }
    if primary.delegator_count() != reference.delegator_count() {
        return Err(mismatch(
            RecordField::DelegatorCount,
            primary.delegator_count().to_string(),
            reference.delegator_count().to_string(),
        ));
    }
    if !primary.delegator_balances.is_empty() {
        if let Some((p, r)) =
            first_balance_difference(&primary.delegator_balances, &reference.delegator_balances)
        {
            return Err(mismatch(RecordField::DelegatorBalances, p, r));
        }
    }
    if primary.total_reward_amount != reference.total_reward_amount {
        return Err(mismatch(
            RecordField::TotalRewards,
            primary.total_reward_amount.to_string(),
            reference.total_reward_amount.to_string(),
        ));
    }
    Ok(())
}

/// Computes a cycle's record on the primary backend and, when a reference
/// backend is configured, recomputes and compares it. Fails closed.
pub struct RewardCrossValidator {
    primary: RewardCalculator,
    reference: Option<RewardCalculator>,
}

impl RewardCrossValidator {
    pub fn new(primary: RewardCalculator, reference: Option<RewardCalculator>) -> Self {
        Self { primary, reference }
    }

    pub fn validates(&self) -> bool {
        self.reference.is_some()
    }

    pub async fn compute(&self, cycle: i64) -> Result<RewardRecord, RewardError> {
        let record = self.primary.rewards_for_cycle(cycle).await?;
        let Some(reference) = &self.reference else {
            return Ok(record);
        };

        let expected = reference.rewards_for_cycle(cycle).await?;
        compare_records(
            self.primary.backend(),
            &record,
            reference.backend(),
            &expected,
        )?;
        debug!(
            cycle,
            primary = self.primary.backend(),
            reference = reference.backend(),
            "validation passed"
        );
        info!(cycle, total_rewards = record.total_reward_amount, "rewards validated");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{DelegationStatus, RewardStatus};

    fn record() -> RewardRecord {
        let mut delegators = BTreeMap::new();
        delegators.insert("A".to_string(), 10);
        delegators.insert("B".to_string(), 20);
        RewardRecord {
            cycle: 100,
            delegate_staking_balance: 1_000,
            total_reward_amount: 1_050,
            delegator_balances: delegators,
            delegation: DelegationStatus::Complete,
            rewards: RewardStatus::Unfrozen { level: 434176 },
        }
    }

    fn field_of(p: &RewardRecord, r: &RewardRecord) -> Option<RecordField> {
        compare_records("node", p, "mirror", r).err().map(|e| e.field)
    }

    #[test]
    fn identical_records_pass() {
        assert_eq!(field_of(&record(), &record()), None);
    }

    #[test]
    fn one_unit_off_names_the_field() {
        let p = record();

        let mut r = record();
        r.delegate_staking_balance += 1;
        assert_eq!(field_of(&p, &r), Some(RecordField::StakingBalance));

        let mut r = record();
        r.total_reward_amount -= 1;
        assert_eq!(field_of(&p, &r), Some(RecordField::TotalRewards));

        let mut r = record();
        r.delegator_balances.insert("A".into(), 11);
        assert_eq!(field_of(&p, &r), Some(RecordField::DelegatorBalances));

        let mut r = record();
        r.delegator_balances.insert("C".into(), 1);
        assert_eq!(field_of(&p, &r), Some(RecordField::DelegatorCount));
    }

    #[test]
    fn error_message_carries_both_values() {
        let p = record();
        let mut r = record();
        r.delegator_balances.remove("B");
        r.delegator_balances.insert("D".into(), 20);
        let err = compare_records("node", &p, "mirror", &r).unwrap_err();
        assert_eq!(err.cycle, 100);
        assert_eq!(err.primary, "B=20");
        assert_eq!(err.reference, "B missing");
        assert!(err.to_string().contains("delegator balances"));
    }

    #[test]
    fn map_equality_ignores_insertion_order() {
        let p = record();
        let mut r = record();
        r.delegator_balances.clear();
        r.delegator_balances.insert("B".into(), 20);
        r.delegator_balances.insert("A".into(), 10);
        assert_eq!(field_of(&p, &r), None);
    }

    #[test]
    fn empty_maps_still_compare_rewards() {
        let mut p = record();
        p.delegator_balances.clear();
        let mut r = p.clone();
        r.total_reward_amount += 1;
        assert_eq!(field_of(&p, &r), Some(RecordField::TotalRewards));
    }
}
