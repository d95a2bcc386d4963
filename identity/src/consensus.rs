//! Shapes of the lifecycle requests the consensus engine delivers.

use serde::{Deserialize, Serialize};

use crate::keys::{Address, PublicKey};

/// Genesis validator as listed by the engine's init-chain call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub public_key: PublicKey,
    pub power: i64,
    #[serde(default)]
    pub name: String,
}

/// Validator as the engine refers to it in votes and evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusValidator {
    pub address: Address,
    pub power: i64,
}

/// One entry of the previous block's commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInfo {
    pub validator: ConsensusValidator,
    pub signed_last_block: bool,
}

/// Byzantine behaviour reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: String,
    pub validator: ConsensusValidator,
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub height: u64,
    pub proposer_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginBlockRequest {
    pub header: Header,
    #[serde(default)]
    pub last_commit_votes: Vec<VoteInfo>,
    #[serde(default)]
    pub byzantine_validators: Vec<Evidence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBlockRequest {
    pub height: u64,
}
