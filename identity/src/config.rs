//! Protocol parameters of the validator set subsystem.
//!
//! Every field here changes consensus weight or state layout, so all
//! replicas of a network must run with identical values.

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Currency};
use crate::error::{IdentityError, IdentityResult};

/// Default staking token name
pub const DEFAULT_STAKING_CURRENCY: &str = "VT";

/// Default number of heights an unstaked amount waits before maturing
pub const DEFAULT_MATURITY_BLOCKS: u64 = 100;

/// Validator set configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// The single token accepted for stake and unstake
    pub staking_currency: String,

    /// Stake units per unit of voting power
    pub power_unit: u64,

    /// Heights between an unstake and the withdrawal maturing
    pub maturity_blocks: u64,
}

impl IdentityConfig {
    pub fn new() -> Self {
        Self {
            staking_currency: DEFAULT_STAKING_CURRENCY.to_string(),
            power_unit: 1,
            maturity_blocks: DEFAULT_MATURITY_BLOCKS,
        }
    }

    pub fn with_staking_currency(mut self, name: impl Into<String>) -> Self {
        self.staking_currency = name.into();
        self
    }

    pub fn with_power_unit(mut self, unit: u64) -> Self {
        self.power_unit = unit;
        self
    }

    pub fn with_maturity_blocks(mut self, blocks: u64) -> Self {
        self.maturity_blocks = blocks;
        self
    }

    pub fn staking_currency(&self) -> Currency {
        Currency::new(self.staking_currency.clone())
    }

    pub fn power_unit_amount(&self) -> Amount {
        Amount::new(self.power_unit)
    }

    pub fn validate(&self) -> IdentityResult<()> {
        if self.staking_currency.trim().is_empty() {
            return Err(IdentityError::InvalidConfig("staking currency must be set".to_string()));
        }

        if self.power_unit == 0 {
            return Err(IdentityError::InvalidConfig("power unit must be positive".to_string()));
        }

        Ok(())
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self::new()
    }
}
