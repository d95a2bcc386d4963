//! Validator records and the staking payloads that mutate them.

use serde::{Deserialize, Serialize};

use crate::amount::{Coin, Currency};
use crate::error::IdentityResult;
use crate::keys::{Address, PublicKey};

/// One consensus participant as stored in the registry.
///
/// `power == 0` means the entry is inactive history, not deleted. A
/// jailed entry keeps its stake but holds zero power for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub stake_address: Address,
    pub public_key: PublicKey,
    pub power: i64,
    pub name: String,
    pub stake_amount: Coin,
    pub jailed: bool,
}

impl Validator {
    /// Empty entry for an address seen for the first time.
    pub fn empty(address: Address, public_key: PublicKey, currency: Currency) -> Self {
        Self {
            address,
            stake_address: address,
            public_key,
            power: 0,
            name: String::new(),
            stake_amount: Coin::new(currency, 0),
            jailed: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.power > 0
    }

    /// Power to record after a stake change; jailed entries stay at zero.
    pub fn effective_power(&self, power: i64) -> i64 {
        if self.jailed {
            0
        } else {
            power
        }
    }

    pub fn to_bytes(&self) -> IdentityResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> IdentityResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Stake transaction payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub validator_address: Address,
    pub stake_address: Address,
    pub public_key: PublicKey,
    pub name: String,
    pub amount: Coin,
}

/// Unstake transaction payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unstake {
    pub address: Address,
    pub amount: Coin,
}

/// Voting power change handed to the consensus engine at end-block.
/// Zero power removes the key from the engine's active set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub public_key: PublicKey,
    pub power: i64,
}

/// Unstaked amount waiting to mature for its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub stake_address: Address,
    pub validator_address: Address,
    pub amount: Coin,
    pub mature_height: u64,
}

impl Withdrawal {
    pub fn to_bytes(&self) -> IdentityResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> IdentityResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
