//! Transaction routing.
//!
//! Every transaction runs the same pipeline: stateless `validate`, read-only
//! `check` against the manager, mutating `deliver`, then the fee is
//! reported. Rejections at any step become a failed [`TxResult`]; errors
//! that mean the node can no longer trust its state are returned as `Err`.

use protocol_identity::{Coin, IdentityError, StateTree, Stake, Unstake, ValidatorSetManager};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NodeError, NodeResult};

/// The transaction kinds the validator set subsystem handles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transaction {
    Stake(Stake),
    Unstake(Unstake),
}

impl Transaction {
    pub fn kind(&self) -> &'static str {
        match self {
            Transaction::Stake(_) => "stake",
            Transaction::Unstake(_) => "unstake",
        }
    }

    fn amount(&self) -> &Coin {
        match self {
            Transaction::Stake(stake) => &stake.amount,
            Transaction::Unstake(unstake) => &unstake.amount,
        }
    }
}

/// A transaction together with the fee its sender offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTx {
    pub fee: u64,
    pub tx: Transaction,
}

impl RawTx {
    pub fn new(tx: Transaction, fee: u64) -> Self {
        Self { fee, tx }
    }
}

/// Outcome reported back to the engine for one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub ok: bool,
    pub kind: String,
    /// Fee charged; zero when the transaction was rejected
    pub fee: u64,
    pub log: String,
}

impl TxResult {
    fn accepted(tx: &RawTx) -> Self {
        Self { ok: true, kind: tx.tx.kind().to_string(), fee: tx.fee, log: String::new() }
    }

    fn rejected(tx: &RawTx, log: String) -> Self {
        Self { ok: false, kind: tx.tx.kind().to_string(), fee: 0, log }
    }
}

/// Dispatches [`RawTx`] values to the validator set manager
#[derive(Debug, Clone)]
pub struct Router {
    min_fee: u64,
}

impl Router {
    pub fn new(min_fee: u64) -> Self {
        Self { min_fee }
    }

    pub fn min_fee(&self) -> u64 {
        self.min_fee
    }

    /// Checks that need no state.
    pub fn validate(&self, tx: &RawTx) -> NodeResult<()> {
        if tx.fee < self.min_fee {
            return Err(NodeError::InvalidTransaction(format!(
                "fee {} below minimum {}",
                tx.fee, self.min_fee
            )));
        }
        if tx.tx.amount().currency.name.trim().is_empty() {
            return Err(NodeError::InvalidTransaction("amount has no currency".to_string()));
        }
        if let Transaction::Stake(stake) = &tx.tx {
            stake.public_key.ensure_supported()?;
            let derived = stake.public_key.address();
            if derived != stake.validator_address {
                return Err(IdentityError::InvalidPublicKey(format!(
                    "validator address {} is not derived from its key ({})",
                    stake.validator_address, derived
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Read-only preconditions against the current state.
    pub fn check<S: StateTree>(&self, manager: &ValidatorSetManager<S>, tx: &RawTx) -> NodeResult<()> {
        match &tx.tx {
            Transaction::Stake(stake) => manager.check_stake(stake)?,
            Transaction::Unstake(unstake) => manager.check_unstake(unstake)?,
        }
        Ok(())
    }

    pub fn deliver<S: StateTree>(&self, manager: &mut ValidatorSetManager<S>, tx: &RawTx) -> NodeResult<()> {
        match &tx.tx {
            Transaction::Stake(stake) => manager.handle_stake(stake)?,
            Transaction::Unstake(unstake) => manager.handle_unstake(unstake)?,
        }
        Ok(())
    }

    /// Mempool admission: validate and check, no writes.
    pub fn check_tx<S: StateTree>(&self, manager: &ValidatorSetManager<S>, tx: &RawTx) -> NodeResult<TxResult> {
        let outcome = self.validate(tx).and_then(|_| self.check(manager, tx));
        settle(tx, outcome)
    }

    /// Full pipeline including the state change.
    pub fn deliver_tx<S: StateTree>(&self, manager: &mut ValidatorSetManager<S>, tx: &RawTx) -> NodeResult<TxResult> {
        let outcome = self
            .validate(tx)
            .and_then(|_| self.check(manager, tx))
            .and_then(|_| self.deliver(manager, tx));
        let result = settle(tx, outcome)?;
        if result.ok {
            debug!(kind = result.kind.as_str(), fee = result.fee, "transaction delivered");
        }
        Ok(result)
    }
}

fn settle(tx: &RawTx, outcome: NodeResult<()>) -> NodeResult<TxResult> {
    match outcome {
        Ok(()) => Ok(TxResult::accepted(tx)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(kind = tx.tx.kind(), error = %err, "transaction rejected");
            Ok(TxResult::rejected(tx, err.to_string()))
        }
    }
}
