//! baker_rewards — per-cycle rewards and delegator balances for a Tezos baker.
//!
//! Resolves the cycle's roll snapshot, reads the staking balance and every
//! delegator's balance at that block, sums the rewards and fees unfrozen for the
//! cycle, and optionally recomputes everything on a second backend to catch
//! disagreement before anything is paid out. Read-only; no keys; no payouts.

pub mod chain;
pub mod compute;
pub mod network;
pub mod provider;
pub mod verify;

pub use chain::{BlockRef, ChainQueryPort, FetchConfig, Fetcher, InMemoryChain, TransportError};
pub use compute::{
    DelegationStatus, RewardCalculator, RewardError, RewardRecord, RewardStatus,
    SnapshotResolution,
};
pub use network::{ConfigError, NetworkParameters};
pub use provider::{Provider, ProviderConfig, ProviderError, ProviderFactory};
pub use verify::{CrossValidationError, RecordField, RewardCrossValidator};
