//! Per-chain protocol constants used for cycle/level arithmetic.
//!
//! Presets cover the public networks; a JSON file can override them:
//! `{"name": "MAINNET", "blocks_per_cycle": 4096, "preserved_cycles": 5, "blocks_per_roll_snapshot": 256}`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Immutable network constants, supplied once at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
    pub name: String,
    pub blocks_per_cycle: u32,
    /// Freeze depth: rewards unfreeze `preserved_cycles + 1` cycles later.
    pub preserved_cycles: u32,
    pub blocks_per_roll_snapshot: u32,
}

impl NetworkParameters {
    pub fn mainnet() -> Self {
        Self {
            name: "MAINNET".to_string(),
            blocks_per_cycle: 4096,
            preserved_cycles: 5,
            blocks_per_roll_snapshot: 256,
        }
    }

    pub fn alphanet() -> Self {
        Self {
            name: "ALPHANET".to_string(),
            blocks_per_cycle: 2048,
            preserved_cycles: 3,
            blocks_per_roll_snapshot: 128,
        }
    }

    pub fn zeronet() -> Self {
        Self {
            name: "ZERONET".to_string(),
            blocks_per_cycle: 128,
            preserved_cycles: 3,
            blocks_per_roll_snapshot: 8,
        }
    }

    /// Preset by case-insensitive name.
    pub fn for_network(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_uppercase().as_str() {
            "MAINNET" => Ok(Self::mainnet()),
            "ALPHANET" => Ok(Self::alphanet()),
            "ZERONET" => Ok(Self::zeronet()),
            _ => Err(ConfigError::UnknownNetwork(name.to_string())),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let params: Self = serde_json::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocks_per_cycle == 0 {
            return Err(ConfigError::Invalid("blocks_per_cycle must be positive".into()));
        }
        if self.blocks_per_roll_snapshot == 0 {
            return Err(ConfigError::Invalid(
                "blocks_per_roll_snapshot must be positive".into(),
            ));
        }
        if self.blocks_per_cycle % self.blocks_per_roll_snapshot != 0 {
            return Err(ConfigError::Invalid(format!(
                "blocks_per_roll_snapshot {} does not divide blocks_per_cycle {}",
                self.blocks_per_roll_snapshot, self.blocks_per_cycle
            )));
        }
        Ok(())
    }

    /// Roll snapshots taken per cycle; valid snapshot indices are `0..count`.
    pub fn snapshots_per_cycle(&self) -> i64 {
        i64::from(self.blocks_per_cycle / self.blocks_per_roll_snapshot.max(1))
    }

    /// Last block of the cycle in which rewards of `cycle` are unfrozen.
    /// `None` when the level does not fit in an `i64`.
    pub fn unfreeze_level(&self, cycle: i64) -> Option<i64> {
        cycle
            .checked_add(i64::from(self.preserved_cycles) + 1)?
            .checked_mul(i64::from(self.blocks_per_cycle))
    }

    /// First block of `cycle`.
    pub fn first_level_of(&self, cycle: i64) -> Option<i64> {
        cycle
            .checked_mul(i64::from(self.blocks_per_cycle))?
            .checked_add(1)
    }
}
