//! Scripted block sequences for replaying the validator set lifecycle.
//!
//! A scenario is a JSON document:
//!
//! ```json
//! {
//!   "genesis": [{ "key": { "key_type": "ed25519", "hex": "..." }, "power": 10 }],
//!   "blocks": [
//!     {
//!       "height": 1,
//!       "transactions": [
//!         { "type": "stake", "key": { "key_type": "ed25519", "hex": "..." }, "amount": "500" }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Blocks that leave out `votes` reuse the application's engine view, so a
//! well-formed scenario only spells out votes when it wants to exercise a
//! divergence.

use protocol_identity::{
    Address, Amount, BeginBlockRequest, Coin, ConsensusValidator, Currency, CurrencyList, EndBlockRequest,
    Evidence, GenesisValidator, Header, KeyAlgorithm, ManagerState, PublicKey, Stake, Unstake, VoteInfo,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::app::Application;
use crate::error::{NodeError, NodeResult};
use crate::router::{RawTx, Transaction, TxResult};

/// Public key written as algorithm name plus hex bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioKey {
    pub key_type: String,
    pub hex: String,
}

impl ScenarioKey {
    pub fn to_public_key(&self) -> NodeResult<PublicKey> {
        let data = hex::decode(self.hex.trim_start_matches("0x"))
            .map_err(|e| NodeError::InvalidScenario(format!("key {:?}: {}", self.hex, e)))?;
        Ok(PublicKey::new(KeyAlgorithm::parse(&self.key_type), data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioGenesis {
    pub key: ScenarioKey,
    pub power: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioTx {
    Stake {
        key: ScenarioKey,
        /// Defaults to the address derived from `key`
        #[serde(default)]
        validator: Option<Address>,
        /// Defaults to the validator address
        #[serde(default)]
        owner: Option<Address>,
        #[serde(default)]
        name: String,
        amount: Amount,
        #[serde(default)]
        currency: Option<String>,
        #[serde(default)]
        fee: u64,
    },
    Unstake {
        validator: Address,
        amount: Amount,
        #[serde(default)]
        currency: Option<String>,
        #[serde(default)]
        fee: u64,
    },
}

impl ScenarioTx {
    /// Resolves keys and fills defaults. `staking` is used when the entry
    /// names no currency.
    pub fn to_raw(&self, staking: &Currency) -> NodeResult<RawTx> {
        let currency_of = |name: &Option<String>| match name {
            Some(name) => Currency::new(name.clone()),
            None => staking.clone(),
        };

        match self {
            ScenarioTx::Stake { key, validator, owner, name, amount, currency, fee } => {
                let public_key = key.to_public_key()?;
                let validator_address = validator.unwrap_or_else(|| public_key.address());
                let stake = Stake {
                    validator_address,
                    stake_address: owner.unwrap_or(validator_address),
                    public_key,
                    name: name.clone(),
                    amount: Coin::new(currency_of(currency), amount.clone()),
                };
                Ok(RawTx::new(Transaction::Stake(stake), *fee))
            }
            ScenarioTx::Unstake { validator, amount, currency, fee } => {
                let unstake = Unstake { address: *validator, amount: Coin::new(currency_of(currency), amount.clone()) };
                Ok(RawTx::new(Transaction::Unstake(unstake), *fee))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioBlock {
    pub height: u64,
    #[serde(default)]
    pub proposer: Option<Address>,
    /// Last-commit votes; the application's engine view when absent
    #[serde(default)]
    pub votes: Option<Vec<ConsensusValidator>>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub transactions: Vec<ScenarioTx>,
    /// Roll the block back instead of committing it
    #[serde(default)]
    pub abandon: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub genesis: Vec<ScenarioGenesis>,
    #[serde(default)]
    pub blocks: Vec<ScenarioBlock>,
}

/// One validator update in report form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub address: Address,
    pub key_type: String,
    pub power: i64,
}

/// What happened to one scenario block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOutcome {
    pub height: u64,
    pub transactions: Vec<TxResult>,
    pub updates: Vec<UpdateLine>,
    pub fees: u64,
    pub version: Option<u64>,
    pub hash: Option<String>,
}

impl Scenario {
    pub fn from_json(json: &str) -> NodeResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> NodeResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn genesis_validators(&self) -> NodeResult<Vec<GenesisValidator>> {
        self.genesis
            .iter()
            .map(|g| Ok(GenesisValidator { public_key: g.key.to_public_key()?, power: g.power, name: g.name.clone() }))
            .collect()
    }

    /// Runs genesis (unless the application resumed from a snapshot) and
    /// every block, stopping at the first error.
    pub fn run(&self, app: &mut Application, currencies: &CurrencyList) -> NodeResult<Vec<BlockOutcome>> {
        if app.manager().state() == ManagerState::Uninitialized {
            app.init_chain(&self.genesis_validators()?, currencies)?;
        }
        self.blocks.iter().map(|block| run_block(app, block)).collect()
    }
}

/// Drives one block through begin, deliver, end and commit.
pub fn run_block(app: &mut Application, block: &ScenarioBlock) -> NodeResult<BlockOutcome> {
    let votes = match &block.votes {
        Some(votes) => votes.clone(),
        None => app
            .manager()
            .active_view()
            .iter()
            .map(|(address, power)| ConsensusValidator { address: *address, power: *power })
            .collect(),
    };
    let proposer = block
        .proposer
        .or_else(|| votes.first().map(|v| v.address))
        .unwrap_or_default();

    app.begin_block(&BeginBlockRequest {
        header: Header { height: block.height, proposer_address: proposer },
        last_commit_votes: votes
            .into_iter()
            .map(|validator| VoteInfo { validator, signed_last_block: true })
            .collect(),
        byzantine_validators: block.evidence.clone(),
    })?;

    let staking = app.config().identity.staking_currency();
    let mut transactions = Vec::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        transactions.push(app.deliver_tx(&tx.to_raw(&staking)?)?);
    }

    if block.abandon {
        app.abandon_block();
        debug!(height = block.height, "scenario block abandoned");
        return Ok(BlockOutcome {
            height: block.height,
            transactions,
            updates: Vec::new(),
            fees: 0,
            version: None,
            hash: None,
        });
    }

    let response = app.end_block(&EndBlockRequest { height: block.height })?;
    let commit = app.commit()?;
    let updates = response
        .validator_updates
        .iter()
        .map(|u| UpdateLine {
            address: u.public_key.address(),
            key_type: u.public_key.algorithm.name().to_string(),
            power: u.power,
        })
        .collect();

    Ok(BlockOutcome {
        height: block.height,
        transactions,
        updates,
        fees: response.fees,
        version: Some(commit.version),
        hash: Some(commit.hash_hex()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_scenario() {
        let scenario = Scenario::from_json(r#"{ "blocks": [{ "height": 1 }] }"#).unwrap();
        assert!(scenario.genesis.is_empty());
        assert_eq!(scenario.blocks[0].height, 1);
        assert!(scenario.blocks[0].votes.is_none());
        assert!(!scenario.blocks[0].abandon);
    }

    #[test]
    fn test_stake_defaults_resolve_from_key() {
        let tx: ScenarioTx = serde_json::from_str(
            r#"{ "type": "stake", "key": { "key_type": "ed25519", "hex": "0x0101" }, "amount": "25", "fee": 2 }"#,
        )
        .unwrap();
        let raw = tx.to_raw(&Currency::new("VT")).unwrap();
        assert_eq!(raw.fee, 2);
        match raw.tx {
            Transaction::Stake(stake) => {
                let derived = PublicKey::ed25519(vec![1, 1]).address();
                assert_eq!(stake.validator_address, derived);
                assert_eq!(stake.stake_address, derived);
                assert_eq!(stake.amount.currency.name, "VT");
                assert_eq!(stake.amount.amount, Amount::new(25));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_key_hex_is_scenario_error() {
        let key = ScenarioKey { key_type: "ed25519".to_string(), hex: "zz".to_string() };
        assert!(matches!(key.to_public_key(), Err(NodeError::InvalidScenario(_))));
    }
}
