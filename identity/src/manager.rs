//! # Validator Set Manager
//!
//! Drives the validator set through the block lifecycle the consensus
//! engine imposes on every height:
//!
//! 1. [`init`](ValidatorSetManager::init), once, at genesis
//! 2. [`set`](ValidatorSetManager::set) at begin-block: reconcile against the
//!    last commit and apply byzantine evidence
//! 3. [`handle_stake`](ValidatorSetManager::handle_stake) /
//!    [`handle_unstake`](ValidatorSetManager::handle_unstake) per transaction
//! 4. [`get_end_block_update`](ValidatorSetManager::get_end_block_update):
//!    drain due queue entries into ordered power updates
//! 5. [`commit`](ValidatorSetManager::commit)
//!
//! Calls for one height arrive sequentially on one thread. Every outcome
//! depends only on the ordered inputs of the height: all set comparisons
//! and aggregations walk address-sorted collections.
//!
//! Registry power is updated as soon as a transaction executes; the
//! engine learns about the change when the queue entry is drained at
//! end-block.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

use crate::amount::{Amount, Coin, CurrencyList};
use crate::commit::{commit_tree, CommitInfo};
use crate::config::IdentityConfig;
use crate::consensus::{BeginBlockRequest, EndBlockRequest, GenesisValidator};
use crate::error::{IdentityError, IdentityResult};
use crate::evidence::apply_evidence;
use crate::keys::Address;
use crate::power::power_from_stake;
use crate::queue::{QueueEntry, ValidatorQueue};
use crate::registry::ValidatorRegistry;
use crate::state::StateTree;
use crate::validator::{Stake, Unstake, Validator, ValidatorUpdate, Withdrawal};

/// Lifecycle state of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Active,
}

/// Owns the registry (and through it the state tree), the power-change
/// queue and the per-block bookkeeping.
#[derive(Debug)]
pub struct ValidatorSetManager<S: StateTree> {
    config: IdentityConfig,
    power_unit: Amount,
    registry: ValidatorRegistry<S>,
    queue: ValidatorQueue,
    byzantine: Vec<Address>,
    proposer: Option<Address>,
    height: u64,
    /// Power of every validator as last reported to the engine
    active_view: BTreeMap<Address, i64>,
    /// Engine view and queue as of the last commit, restored on rollback
    committed_view: BTreeMap<Address, i64>,
    committed_queue: ValidatorQueue,
    state: ManagerState,
}

impl<S: StateTree> ValidatorSetManager<S> {
    /// Builds a manager over `tree`. A tree that already carries committed
    /// versions (restored from a snapshot) starts out active with its
    /// registry's active set as the engine's view.
    pub fn new(config: IdentityConfig, tree: S) -> IdentityResult<Self> {
        config.validate()?;
        let power_unit = config.power_unit_amount();
        let registry = ValidatorRegistry::new(tree);

        let mut manager = Self {
            config,
            power_unit,
            registry,
            queue: ValidatorQueue::new(),
            byzantine: Vec::new(),
            proposer: None,
            height: 0,
            active_view: BTreeMap::new(),
            committed_view: BTreeMap::new(),
            committed_queue: ValidatorQueue::new(),
            state: ManagerState::Uninitialized,
        };

        let version = manager.registry.tree().version();
        if version > 0 {
            manager.height = version;
            manager.active_view = manager
                .registry
                .active()?
                .into_iter()
                .map(|v| (v.address, v.power))
                .collect();
            manager.committed_view = manager.active_view.clone();
            manager.state = ManagerState::Active;
            info!(version, active = manager.active_view.len(), "validator set resumed from committed state");
        }

        Ok(manager)
    }

    /// Loads the genesis validators. They are active immediately and
    /// nothing is queued for them. Returns the total initial power.
    pub fn init(&mut self, validators: &[GenesisValidator], currencies: &CurrencyList) -> IdentityResult<i64> {
        if self.state == ManagerState::Active {
            return Err(IdentityError::InvalidConfig("validator set already initialized".to_string()));
        }

        if currencies.get_by_name(&self.config.staking_currency).is_none() {
            return Err(IdentityError::UnregisteredStakeToken(self.config.staking_currency.clone()));
        }

        // Validate the whole batch before the first write.
        let mut seen = BTreeSet::new();
        let mut total: i64 = 0;
        for genesis in validators {
            genesis.public_key.ensure_supported()?;
            genesis.public_key.verifying_key()?;
            if genesis.power < 0 {
                return Err(IdentityError::InvalidConfig(format!("negative genesis power {}", genesis.power)));
            }
            let address = genesis.public_key.address();
            if !seen.insert(address) {
                return Err(IdentityError::InvalidConfig(format!("duplicate genesis validator {}", address)));
            }
            total = total
                .checked_add(genesis.power)
                .ok_or_else(|| IdentityError::PowerOverflow(format!("total genesis power past {}", total)))?;
        }

        let currency = self.config.staking_currency();
        for genesis in validators {
            let address = genesis.public_key.address();
            let stake = Amount::from(genesis.power as u64).as_biguint() * self.power_unit.as_biguint();
            let validator = Validator {
                address,
                stake_address: address,
                public_key: genesis.public_key.clone(),
                power: genesis.power,
                name: genesis.name.clone(),
                stake_amount: Coin::new(currency.clone(), Amount::from(stake)),
                jailed: false,
            };
            self.registry.set(&validator)?;
            if validator.is_active() {
                self.active_view.insert(address, validator.power);
            }
            debug!(%address, power = genesis.power, "genesis validator registered");
        }

        self.state = ManagerState::Active;
        info!(validators = validators.len(), total_power = total, "validator set initialized");
        Ok(total)
    }

    /// Begin-block. Fails with `ValidatorSetMismatch` when the engine's
    /// last-commit votes and the local active set differ in membership or
    /// power; evidence is applied only after a clean reconciliation.
    pub fn set(&mut self, request: &BeginBlockRequest) -> IdentityResult<()> {
        self.height = request.header.height;
        self.proposer = Some(request.header.proposer_address);
        self.byzantine.clear();
        self.state = ManagerState::Active;

        self.reconcile(request)?;

        let punished = apply_evidence(
            &mut self.registry,
            &mut self.queue,
            &request.byzantine_validators,
            self.height,
        )?;
        if !punished.is_empty() {
            warn!(height = self.height, count = punished.len(), "byzantine validators zeroed");
        }
        self.byzantine = punished;
        Ok(())
    }

    fn reconcile(&self, request: &BeginBlockRequest) -> IdentityResult<()> {
        let local: BTreeMap<Address, i64> = self
            .registry
            .active()?
            .into_iter()
            .map(|v| (v.address, v.power))
            .collect();

        let mut reported: BTreeMap<Address, i64> = BTreeMap::new();
        for vote in &request.last_commit_votes {
            let address = vote.validator.address;
            if reported.insert(address, vote.validator.power).is_some() {
                return Err(self.mismatch(format!("validator {} voted twice", address)));
            }
        }

        for (address, power) in &local {
            match reported.get(address) {
                None => return Err(self.mismatch(format!("active validator {} missing from last commit", address))),
                Some(seen) if seen != power => {
                    return Err(self.mismatch(format!(
                        "power mismatch for {}: local {}, last commit {}",
                        address, power, seen
                    )))
                }
                Some(_) => {}
            }
        }

        if let Some(extra) = reported.keys().find(|address| !local.contains_key(*address)) {
            return Err(self.mismatch(format!("last commit includes unknown validator {}", extra)));
        }

        Ok(())
    }

    fn mismatch(&self, reason: String) -> IdentityError {
        error!(height = self.height, %reason, "validator set diverged from consensus engine");
        IdentityError::ValidatorSetMismatch { reason }
    }

    /// Read-only preconditions of [`handle_stake`](Self::handle_stake).
    pub fn check_stake(&self, stake: &Stake) -> IdentityResult<()> {
        self.ensure_staking_currency(&stake.amount)?;
        stake.public_key.ensure_supported()
    }

    /// Adds stake to a validator, creating its entry on first use, and
    /// queues the resulting power for the next end-block. A jailed
    /// validator only accumulates stake.
    pub fn handle_stake(&mut self, stake: &Stake) -> IdentityResult<()> {
        self.check_stake(stake)?;

        let address = stake.validator_address;
        let mut validator = match self.registry.get(&address)? {
            Some(existing) => existing,
            None => {
                let mut fresh = Validator::empty(address, stake.public_key.clone(), self.config.staking_currency());
                fresh.stake_address = stake.stake_address;
                fresh
            }
        };
        if !stake.name.is_empty() {
            validator.name = stake.name.clone();
        }

        let staked = validator.stake_amount.amount.checked_add(&stake.amount.amount);
        let power = validator.effective_power(power_from_stake(&staked, &self.power_unit)?);
        validator.stake_amount.amount = staked;
        validator.power = power;

        self.registry.set(&validator)?;
        self.queue_power_change(&validator);
        debug!(%address, amount = %stake.amount, power, height = self.height, "stake applied");
        Ok(())
    }

    /// Read-only preconditions of [`handle_unstake`](Self::handle_unstake).
    ///
    /// The entry must exist in committed state; a stake made earlier in the
    /// same, still uncommitted, block does not count.
    pub fn check_unstake(&self, unstake: &Unstake) -> IdentityResult<()> {
        if self.registry.get_committed(&unstake.address)?.is_none() {
            return Err(IdentityError::EntryNotFound(unstake.address));
        }
        self.ensure_staking_currency(&unstake.amount)?;

        let validator = self
            .registry
            .get(&unstake.address)?
            .ok_or(IdentityError::EntryNotFound(unstake.address))?;
        if validator.stake_amount.amount.checked_sub(&unstake.amount.amount).is_none() {
            return Err(IdentityError::InsufficientStake {
                address: unstake.address,
                staked: validator.stake_amount.amount.to_string(),
                requested: unstake.amount.amount.to_string(),
            });
        }
        Ok(())
    }

    /// Withdraws stake, queues the reduced power and records a withdrawal
    /// for the stake owner that matures `maturity_blocks` later.
    pub fn handle_unstake(&mut self, unstake: &Unstake) -> IdentityResult<()> {
        self.check_unstake(unstake)?;

        let address = unstake.address;
        let mut validator = self.registry.get(&address)?.ok_or(IdentityError::EntryNotFound(address))?;
        let remaining = validator
            .stake_amount
            .amount
            .checked_sub(&unstake.amount.amount)
            .ok_or_else(|| IdentityError::InsufficientStake {
                address,
                staked: validator.stake_amount.amount.to_string(),
                requested: unstake.amount.amount.to_string(),
            })?;
        let power = validator.effective_power(power_from_stake(&remaining, &self.power_unit)?);
        validator.stake_amount.amount = remaining;
        validator.power = power;

        self.registry.set(&validator)?;
        if !unstake.amount.amount.is_zero() {
            self.registry.add_withdrawal(&Withdrawal {
                stake_address: validator.stake_address,
                validator_address: address,
                amount: unstake.amount.clone(),
                mature_height: self.height.saturating_add(self.config.maturity_blocks),
            })?;
        }
        self.queue_power_change(&validator);
        debug!(%address, amount = %unstake.amount, power, height = self.height, "unstake applied");
        Ok(())
    }

    // Jailed entries were already queued for removal when the evidence
    // arrived; the engine must not hear about them again.
    fn queue_power_change(&mut self, validator: &Validator) {
        if validator.jailed {
            debug!(address = %validator.address, "jailed validator, power stays at zero");
            return;
        }
        self.queue.push(QueueEntry::new(validator.address, self.height, validator.power));
    }

    fn ensure_staking_currency(&self, coin: &Coin) -> IdentityResult<()> {
        if coin.currency.name != self.config.staking_currency {
            return Err(IdentityError::InvalidCurrency {
                expected: self.config.staking_currency.clone(),
                found: coin.currency.name.clone(),
            });
        }
        Ok(())
    }

    /// End-block. Drains every queue entry with `priority <= height` and
    /// returns one update per affected address in extraction order,
    /// carrying the registry's current power. Entries that do not resolve
    /// to a registry record are logged and dropped.
    pub fn get_end_block_update(&mut self, request: &EndBlockRequest) -> Vec<ValidatorUpdate> {
        let due = self.queue.pop_due(request.height);
        let mut emitted = BTreeSet::new();
        let mut updates = Vec::with_capacity(due.len());

        for entry in due {
            if !emitted.insert(entry.address) {
                debug!(address = %entry.address, priority = entry.priority, "address already updated this block");
                continue;
            }

            let validator = match self.registry.get(&entry.address) {
                Ok(Some(validator)) => validator,
                Ok(None) => {
                    warn!(
                        address = %entry.address,
                        priority = entry.priority,
                        "dropping queue entry for unknown validator"
                    );
                    continue;
                }
                Err(err) => {
                    warn!(address = %entry.address, error = %err, "dropping unresolvable queue entry");
                    continue;
                }
            };

            if validator.is_active() {
                self.active_view.insert(validator.address, validator.power);
            } else {
                self.active_view.remove(&validator.address);
            }
            updates.push(ValidatorUpdate { public_key: validator.public_key, power: validator.power });
        }

        if !updates.is_empty() {
            info!(
                height = request.height,
                updates = updates.len(),
                pending = self.queue.len(),
                "validator updates computed"
            );
        }
        updates
    }

    /// Finalizes the block's writes and returns the new root hash and
    /// version. The byzantine list of the block is cleared.
    pub fn commit(&mut self) -> IdentityResult<CommitInfo> {
        let info = commit_tree(self.registry.tree_mut())?;
        self.committed_view = self.active_view.clone();
        self.committed_queue = self.queue.clone();
        self.byzantine.clear();
        Ok(info)
    }

    /// Discards everything a block the engine rejected did: tree writes,
    /// queue entries, the engine view computed at its end-block and its
    /// byzantine list.
    pub fn rollback(&mut self) {
        self.registry.tree_mut().rollback();
        self.active_view = self.committed_view.clone();
        self.queue = self.committed_queue.clone();
        self.byzantine.clear();
    }

    /// Active validators (`power > 0`), ordered by address.
    pub fn get_validator_set(&self) -> IdentityResult<Vec<Validator>> {
        self.registry.active()
    }

    /// Every registry entry including inactive history.
    pub fn get_all_validators(&self) -> IdentityResult<Vec<Validator>> {
        self.registry.all()
    }

    pub fn get_validator(&self, address: &Address) -> IdentityResult<Option<Validator>> {
        self.registry.get(address)
    }

    pub fn stake_amount(&self, address: &Address) -> IdentityResult<Option<Coin>> {
        Ok(self.registry.get(address)?.map(|v| v.stake_amount))
    }

    /// Sum of the owner's withdrawals whose maturity height has been
    /// reached at the current height.
    pub fn get_matured_balance(&self, stake_address: &Address) -> IdentityResult<Coin> {
        let matured = self
            .registry
            .withdrawals(stake_address)?
            .into_iter()
            .filter(|w| w.mature_height <= self.height)
            .fold(Amount::zero(), |sum, w| sum.checked_add(&w.amount.amount));
        Ok(Coin::new(self.config.staking_currency(), matured))
    }

    pub fn pending_withdrawals(&self, stake_address: &Address) -> IdentityResult<Vec<Withdrawal>> {
        self.registry.withdrawals(stake_address)
    }

    pub fn proposer(&self) -> Option<Address> {
        self.proposer
    }

    /// Validators punished at the current height.
    pub fn byzantine(&self) -> &[Address] {
        &self.byzantine
    }

    /// Engine-side view of the active set as of the last end-block.
    pub fn active_view(&self) -> &BTreeMap<Address, i64> {
        &self.active_view
    }

    pub fn queue(&self) -> &ValidatorQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut ValidatorQueue {
        &mut self.queue
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub fn tree(&self) -> &S {
        self.registry.tree()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Currency;
    use crate::consensus::{ConsensusValidator, Evidence, Header, VoteInfo};
    use crate::keys::PublicKey;
    use crate::state::MemoryTree;

    fn manager() -> ValidatorSetManager<MemoryTree> {
        ValidatorSetManager::new(IdentityConfig::default(), MemoryTree::new()).unwrap()
    }

    fn stake(byte: u8, amount: u64) -> Stake {
        let address = Address::from([byte; 20]);
        Stake {
            validator_address: address,
            stake_address: address,
            public_key: PublicKey::ed25519(vec![byte; 32]),
            name: format!("v{}", byte),
            amount: Coin::new(Currency::new("VT"), amount),
        }
    }

    fn begin(height: u64, votes: &[(u8, i64)]) -> BeginBlockRequest {
        BeginBlockRequest {
            header: Header { height, proposer_address: Address::from([0u8; 20]) },
            last_commit_votes: votes
                .iter()
                .map(|(byte, power)| VoteInfo {
                    validator: ConsensusValidator { address: Address::from([*byte; 20]), power: *power },
                    signed_last_block: true,
                })
                .collect(),
            byzantine_validators: Vec::new(),
        }
    }

    #[test]
    fn test_fresh_manager() {
        let m = manager();
        assert_eq!(m.queue().len(), 0);
        assert!(m.byzantine().is_empty());
        assert!(m.proposer().is_none());
        assert!(m.get_validator_set().unwrap().is_empty());
        assert_eq!(m.state(), ManagerState::Uninitialized);
    }

    #[test]
    fn test_stake_updates_registry_before_end_block() {
        let mut m = manager();
        m.handle_stake(&stake(1, 300)).unwrap();
        let v = m.get_validator(&Address::from([1u8; 20])).unwrap().unwrap();
        assert_eq!(v.power, 300);
        assert!(m.active_view().is_empty());

        let updates = m.get_end_block_update(&EndBlockRequest { height: 0 });
        assert_eq!(updates.len(), 1);
        assert_eq!(m.active_view().get(&Address::from([1u8; 20])), Some(&300));
    }

    #[test]
    fn test_repeated_stakes_emit_one_update() {
        let mut m = manager();
        m.handle_stake(&stake(1, 100)).unwrap();
        m.handle_stake(&stake(1, 50)).unwrap();
        let updates = m.get_end_block_update(&EndBlockRequest { height: 0 });
        assert_eq!(updates, vec![ValidatorUpdate { public_key: PublicKey::ed25519(vec![1; 32]), power: 150 }]);
    }

    #[test]
    fn test_set_power_mismatch() {
        let mut m = manager();
        m.handle_stake(&stake(1, 100)).unwrap();
        m.commit().unwrap();
        let err = m.set(&begin(2, &[(1, 99)])).unwrap_err();
        assert!(matches!(err, IdentityError::ValidatorSetMismatch { .. }));
        assert!(err.is_fatal());
        assert!(m.set(&begin(2, &[(1, 100)])).is_ok());
    }

    #[test]
    fn test_duplicate_votes_rejected() {
        let mut m = manager();
        m.handle_stake(&stake(1, 100)).unwrap();
        m.commit().unwrap();
        assert!(m.set(&begin(2, &[(1, 100), (1, 100)])).is_err());
    }

    #[test]
    fn test_evidence_applied_after_reconcile() {
        let mut m = manager();
        m.handle_stake(&stake(1, 100)).unwrap();
        m.handle_stake(&stake(2, 100)).unwrap();
        m.get_end_block_update(&EndBlockRequest { height: 0 });
        m.commit().unwrap();

        let mut request = begin(1, &[(1, 100), (2, 100)]);
        request.byzantine_validators.push(Evidence {
            kind: "duplicate/vote".to_string(),
            validator: ConsensusValidator { address: Address::from([2u8; 20]), power: 100 },
            height: 1,
        });
        m.set(&request).unwrap();
        assert_eq!(m.byzantine(), &[Address::from([2u8; 20])]);

        let updates = m.get_end_block_update(&EndBlockRequest { height: 1 });
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].power, 0);
        m.commit().unwrap();
        assert!(m.byzantine().is_empty());

        // Stake is kept, only power is zeroed
        let stake = m.stake_amount(&Address::from([2u8; 20])).unwrap().unwrap();
        assert_eq!(stake.amount, Amount::new(100));
        assert!(m.set(&begin(2, &[(1, 100)])).is_ok());
    }

    #[test]
    fn test_unstake_insufficient() {
        let mut m = manager();
        m.handle_stake(&stake(1, 10)).unwrap();
        m.commit().unwrap();

        let unstake = Unstake { address: Address::from([1u8; 20]), amount: Coin::new(Currency::new("VT"), 11) };
        assert!(matches!(m.handle_unstake(&unstake), Err(IdentityError::InsufficientStake { .. })));
        assert_eq!(m.stake_amount(&Address::from([1u8; 20])).unwrap().unwrap().amount, Amount::new(10));
    }

    #[test]
    fn test_matured_balance() {
        let config = IdentityConfig::default().with_maturity_blocks(2);
        let mut m = ValidatorSetManager::new(config, MemoryTree::new()).unwrap();
        m.handle_stake(&stake(1, 10)).unwrap();
        m.commit().unwrap();

        m.set(&begin(1, &[(1, 10)])).unwrap();
        let unstake = Unstake { address: Address::from([1u8; 20]), amount: Coin::new(Currency::new("VT"), 4) };
        m.handle_unstake(&unstake).unwrap();
        m.commit().unwrap();

        let owner = Address::from([1u8; 20]);
        assert!(m.get_matured_balance(&owner).unwrap().amount.is_zero());
        assert_eq!(m.pending_withdrawals(&owner).unwrap().len(), 1);

        m.set(&begin(3, &[(1, 6)])).unwrap();
        assert_eq!(m.get_matured_balance(&owner).unwrap().amount, Amount::new(4));
    }

    #[test]
    fn test_power_unit_scales_power() {
        let config = IdentityConfig::default().with_power_unit(100);
        let mut m = ValidatorSetManager::new(config, MemoryTree::new()).unwrap();
        m.handle_stake(&stake(1, 250)).unwrap();
        assert_eq!(m.get_validator(&Address::from([1u8; 20])).unwrap().unwrap().power, 2);
    }

    #[test]
    fn test_resume_from_committed_tree() {
        let mut m = manager();
        m.handle_stake(&stake(3, 70)).unwrap();
        m.commit().unwrap();
        let tree = m.tree().clone();

        let resumed = ValidatorSetManager::new(IdentityConfig::default(), tree).unwrap();
        assert_eq!(resumed.state(), ManagerState::Active);
        assert_eq!(resumed.active_view().get(&Address::from([3u8; 20])), Some(&70));
    }
}
