//! # Block Lifecycle Application
//!
//! [`Application`] is what the consensus engine talks to. It owns the
//! validator set manager and the transaction router, and enforces the call
//! order of a height: `begin_block`, any number of `deliver_tx`,
//! `end_block`, then `commit` (or `abandon_block` if the engine drops the
//! block).
//!
//! A fatal error from the validator set (a divergence from the engine's
//! view, a corrupt record) halts the application. The first failing call
//! returns the underlying error; every call after it fails with
//! [`NodeError::Halted`].

use protocol_identity::{
    BeginBlockRequest, CommitInfo, CurrencyList, EndBlockRequest, GenesisValidator, MemoryTree, StateTree,
    ValidatorSetManager, ValidatorUpdate,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::router::{RawTx, Router, TxResult};

/// What the engine receives at end-block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBlockResponse {
    pub height: u64,
    pub validator_updates: Vec<ValidatorUpdate>,
    /// Fees charged by the transactions delivered in this block
    pub fees: u64,
}

#[derive(Debug)]
pub struct Application {
    config: NodeConfig,
    manager: ValidatorSetManager<MemoryTree>,
    router: Router,
    halted: Option<String>,
    block_fees: u64,
    last_commit: Option<CommitInfo>,
}

impl Application {
    /// Builds the application, restoring state from the configured snapshot
    /// when one exists on disk.
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        config.validate()?;

        let tree = match &config.snapshot_path {
            Some(path) if path.exists() => MemoryTree::load_snapshot(path)?,
            Some(path) => {
                info!(path = %path.display(), "no snapshot found, starting from empty state");
                MemoryTree::new()
            }
            None => MemoryTree::new(),
        };

        let last_commit = (tree.version() > 0).then(|| CommitInfo { hash: tree.root_hash(), version: tree.version() });
        let manager = ValidatorSetManager::new(config.identity.clone(), tree)?;
        let router = Router::new(config.min_fee);

        Ok(Self { config, manager, router, halted: None, block_fees: 0, last_commit })
    }

    pub fn init_chain(&mut self, validators: &[GenesisValidator], currencies: &CurrencyList) -> NodeResult<i64> {
        self.ensure_running()?;
        let total = self.manager.init(validators, currencies)?;
        info!(validators = validators.len(), total_power = total, "chain initialized");
        Ok(total)
    }

    pub fn begin_block(&mut self, request: &BeginBlockRequest) -> NodeResult<()> {
        self.ensure_running()?;
        self.block_fees = 0;
        let outcome = self.manager.set(request).map_err(NodeError::from);
        self.guard(outcome)
    }

    /// Mempool admission. Never writes state.
    pub fn check_tx(&self, tx: &RawTx) -> NodeResult<TxResult> {
        self.ensure_running()?;
        self.router.check_tx(&self.manager, tx)
    }

    pub fn deliver_tx(&mut self, tx: &RawTx) -> NodeResult<TxResult> {
        self.ensure_running()?;
        let outcome = self.router.deliver_tx(&mut self.manager, tx);
        let result = self.guard(outcome)?;
        if result.ok {
            self.block_fees = self.block_fees.saturating_add(result.fee);
        }
        Ok(result)
    }

    pub fn end_block(&mut self, request: &EndBlockRequest) -> NodeResult<EndBlockResponse> {
        self.ensure_running()?;
        let validator_updates = self.manager.get_end_block_update(request);
        Ok(EndBlockResponse { height: request.height, validator_updates, fees: self.block_fees })
    }

    /// Commits the block and, when configured, rewrites the snapshot.
    pub fn commit(&mut self) -> NodeResult<CommitInfo> {
        self.ensure_running()?;
        let outcome = self.manager.commit().map_err(NodeError::from);
        let commit = self.guard(outcome)?;

        if let Some(path) = &self.config.snapshot_path {
            self.manager.tree().save_snapshot(path)?;
        }
        self.block_fees = 0;
        self.last_commit = Some(commit);
        Ok(commit)
    }

    /// Drops every write of the current block.
    pub fn abandon_block(&mut self) {
        warn!(height = self.manager.height(), "block abandoned before commit");
        self.manager.rollback();
        self.block_fees = 0;
    }

    fn ensure_running(&self) -> NodeResult<()> {
        match &self.halted {
            Some(reason) => Err(NodeError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn guard<T>(&mut self, outcome: NodeResult<T>) -> NodeResult<T> {
        if let Err(err) = &outcome {
            if err.is_fatal() {
                error!(height = self.manager.height(), error = %err, "halting node");
                self.halted = Some(err.to_string());
            }
        }
        outcome
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn last_commit(&self) -> Option<CommitInfo> {
        self.last_commit
    }

    pub fn manager(&self) -> &ValidatorSetManager<MemoryTree> {
        &self.manager
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_identity::{Address, Coin, Currency, Header, PublicKey, Stake, VoteInfo};

    use crate::router::Transaction;

    fn app() -> Application {
        Application::new(NodeConfig::default()).unwrap()
    }

    fn stake(byte: u8, amount: u64, fee: u64) -> RawTx {
        let public_key = PublicKey::ed25519(vec![byte; 32]);
        let address = public_key.address();
        RawTx::new(
            Transaction::Stake(Stake {
                validator_address: address,
                stake_address: address,
                public_key,
                name: String::new(),
                amount: Coin::new(Currency::new("VT"), amount),
            }),
            fee,
        )
    }

    fn begin(height: u64, votes: Vec<VoteInfo>) -> BeginBlockRequest {
        BeginBlockRequest {
            header: Header { height, proposer_address: Address::default() },
            last_commit_votes: votes,
            byzantine_validators: Vec::new(),
        }
    }

    #[test]
    fn test_fees_accumulate_per_block() {
        let mut app = app();
        app.begin_block(&begin(1, Vec::new())).unwrap();
        app.deliver_tx(&stake(1, 10, 2)).unwrap();
        app.deliver_tx(&stake(2, 10, 5)).unwrap();
        let response = app.end_block(&EndBlockRequest { height: 1 }).unwrap();
        assert_eq!(response.fees, 7);
        assert_eq!(response.validator_updates.len(), 2);

        app.commit().unwrap();
        assert_eq!(app.last_commit().map(|c| c.version), Some(1));
    }

    #[test]
    fn test_mismatch_halts() {
        let mut app = app();
        let err = app.begin_block(&begin(1, vec![VoteInfo {
            validator: protocol_identity::ConsensusValidator { address: Address::from([3u8; 20]), power: 1 },
            signed_last_block: true,
        }]));
        assert!(matches!(err, Err(NodeError::Identity(_))));
        assert!(app.is_halted());
        assert!(matches!(app.end_block(&EndBlockRequest { height: 1 }), Err(NodeError::Halted(_))));
        assert!(matches!(app.commit(), Err(NodeError::Halted(_))));
    }

    #[test]
    fn test_abandon_block_discards_writes() {
        let mut app = app();
        app.begin_block(&begin(1, Vec::new())).unwrap();
        app.deliver_tx(&stake(1, 10, 0)).unwrap();
        app.abandon_block();
        assert!(app.manager().get_validator_set().unwrap().is_empty());
        assert!(app.end_block(&EndBlockRequest { height: 1 }).unwrap().validator_updates.is_empty());
    }

    #[test]
    fn test_abandon_after_end_block_restores_view() {
        let mut app = app();
        app.begin_block(&begin(1, Vec::new())).unwrap();
        app.deliver_tx(&stake(1, 10, 0)).unwrap();
        let response = app.end_block(&EndBlockRequest { height: 1 }).unwrap();
        assert_eq!(response.validator_updates.len(), 1);
        assert_eq!(app.manager().active_view().len(), 1);

        app.abandon_block();
        assert!(app.manager().active_view().is_empty());
        assert!(app.begin_block(&begin(1, Vec::new())).is_ok());
        assert!(!app.is_halted());
    }
}
