//! Snapshot resolution, delegation state and reward aggregation.

mod delegation;
mod error;
mod record;
mod snapshot;
mod unfrozen;

pub use delegation::{delegators_at, DelegationState, DelegationStatus};
pub use error::RewardError;
pub use record::{RewardCalculator, RewardRecord};
pub use snapshot::{SnapshotReference, SnapshotResolution, SnapshotResolver};
pub use unfrozen::{
    unfrozen_amount, unfrozen_breakdown, RewardAggregator, RewardStatus, UnfrozenBreakdown,
};
