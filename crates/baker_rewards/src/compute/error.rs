use crate::chain::TransportError;
use crate::verify::CrossValidationError;
use thiserror::Error;

/// Failures of a reward computation. "Not yet available" states are not
/// errors; see `SnapshotResolution` and `RewardStatus`.
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("data inconsistency in cycle {cycle}: {detail}")]
    DataInconsistency { cycle: i64, detail: String },
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    CrossValidation(#[from] CrossValidationError),
}

impl RewardError {
    /// Cycle for which no level can be computed: negative, or so large that
    /// level arithmetic overflows.
    pub(crate) fn cycle_out_of_range(cycle: i64) -> Self {
        RewardError::DataInconsistency {
            cycle,
            detail: "cycle out of range for level arithmetic".to_string(),
        }
    }
}
