//! Authoritative address -> validator mapping, stored one record per key
//! under [`VALIDATOR_PREFIX`] in the state tree.

use tracing::trace;

use crate::error::{IdentityError, IdentityResult};
use crate::keys::Address;
use crate::state::StateTree;
use crate::validator::{Validator, Withdrawal};

/// Key prefix for validator records
pub const VALIDATOR_PREFIX: &[u8] = b"validator/";

/// Key prefix for pending withdrawals
pub const WITHDRAWAL_PREFIX: &[u8] = b"withdrawal/";

fn validator_key(address: &Address) -> Vec<u8> {
    [VALIDATOR_PREFIX, address.as_bytes()].concat()
}

fn withdrawal_key(stake_address: &Address, validator: &Address, mature_height: u64) -> Vec<u8> {
    let height = mature_height.to_be_bytes();
    let parts: [&[u8]; 4] = [WITHDRAWAL_PREFIX, stake_address.as_bytes(), &height, validator.as_bytes()];
    parts.concat()
}

/// Registry backed by a [`StateTree`] it owns
#[derive(Debug)]
pub struct ValidatorRegistry<S: StateTree> {
    tree: S,
}

impl<S: StateTree> ValidatorRegistry<S> {
    pub fn new(tree: S) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &S {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut S {
        &mut self.tree
    }

    /// `None` means no record was ever written, which is distinct from a
    /// record with zero power.
    pub fn get(&self, address: &Address) -> IdentityResult<Option<Validator>> {
        match self.tree.get(&validator_key(address))? {
            Some(bytes) => Ok(Some(Validator::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but ignores writes not yet committed.
    pub fn get_committed(&self, address: &Address) -> IdentityResult<Option<Validator>> {
        match self.tree.get_committed(&validator_key(address))? {
            Some(bytes) => Ok(Some(Validator::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set(&mut self, validator: &Validator) -> IdentityResult<()> {
        trace!(address = %validator.address, power = validator.power, "registry write");
        self.tree.set(&validator_key(&validator.address), validator.to_bytes()?)
    }

    pub fn exists(&self, address: &Address) -> IdentityResult<bool> {
        Ok(self.tree.get(&validator_key(address))?.is_some())
    }

    /// Every record, active or not, ordered by address.
    pub fn all(&self) -> IdentityResult<Vec<Validator>> {
        self.tree
            .iter_prefix(VALIDATOR_PREFIX)?
            .into_iter()
            .map(|(key, bytes)| {
                let validator = Validator::from_bytes(&bytes)?;
                if &key[VALIDATOR_PREFIX.len()..] != validator.address.as_bytes() {
                    return Err(IdentityError::Serialization(format!(
                        "record under key {} holds address {}",
                        hex::encode(&key[VALIDATOR_PREFIX.len()..]),
                        validator.address
                    )));
                }
                Ok(validator)
            })
            .collect()
    }

    /// Records with `power > 0`, ordered by address.
    pub fn active(&self) -> IdentityResult<Vec<Validator>> {
        Ok(self.all()?.into_iter().filter(Validator::is_active).collect())
    }

    pub fn add_withdrawal(&mut self, withdrawal: &Withdrawal) -> IdentityResult<()> {
        let key = withdrawal_key(&withdrawal.stake_address, &withdrawal.validator_address, withdrawal.mature_height);
        // Same owner, validator and height accumulate into one record.
        let merged = match self.tree.get(&key)? {
            Some(bytes) => {
                let mut existing = Withdrawal::from_bytes(&bytes)?;
                existing.amount.amount = existing.amount.amount.checked_add(&withdrawal.amount.amount);
                existing
            }
            None => withdrawal.clone(),
        };
        self.tree.set(&key, merged.to_bytes()?)
    }

    /// Pending withdrawals owned by `stake_address`, ordered by maturity.
    pub fn withdrawals(&self, stake_address: &Address) -> IdentityResult<Vec<Withdrawal>> {
        let prefix = [WITHDRAWAL_PREFIX, stake_address.as_bytes()].concat();
        self.tree
            .iter_prefix(&prefix)?
            .into_iter()
            .map(|(_, bytes)| Withdrawal::from_bytes(&bytes))
            .collect()
    }
}
