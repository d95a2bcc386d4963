//! Shared fixtures for the validator set integration tests.

#![allow(dead_code)]

use ed25519_dalek::SigningKey;
use protocol_identity::{
    Address, BeginBlockRequest, Coin, ConsensusValidator, Currency, CurrencyList, GenesisValidator, Header,
    IdentityConfig, KeyAlgorithm, MemoryTree, PublicKey, Stake, Unstake, ValidatorSetManager, VoteInfo,
};

pub const STAKE_TOKEN: &str = "VT";

pub fn new_manager() -> ValidatorSetManager<MemoryTree> {
    ValidatorSetManager::new(IdentityConfig::default(), MemoryTree::new()).expect("default config is valid")
}

pub fn address(hex: &str) -> Address {
    hex.parse().expect("fixture address")
}

pub fn coin(name: &str, amount: u64) -> Coin {
    Coin::new(Currency { name: name.to_string(), chain: 1 }, amount)
}

pub fn prepare_stake(hex: &str, amount: u64) -> Stake {
    let addr = address(hex);
    Stake {
        validator_address: addr,
        stake_address: addr,
        public_key: PublicKey::ed25519(Vec::new()),
        name: "test_name".to_string(),
        amount: coin(STAKE_TOKEN, amount),
    }
}

pub fn prepare_unstake(hex: &str, amount: u64) -> Unstake {
    Unstake { address: address(hex), amount: coin(STAKE_TOKEN, amount) }
}

/// Deterministic ed25519 key derived from `seed`
pub fn ed25519_key(seed: u8) -> PublicKey {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    PublicKey::ed25519(signing.verifying_key().to_bytes().to_vec())
}

pub fn genesis(key_type: &str, data: Vec<u8>, power: i64) -> GenesisValidator {
    GenesisValidator {
        public_key: PublicKey::new(KeyAlgorithm::parse(key_type), data),
        power,
        name: String::new(),
    }
}

pub fn currencies(names: &[&str]) -> CurrencyList {
    names.iter().map(|name| Currency::new(*name)).collect()
}

pub fn begin_block(height: u64, votes: &[(Address, i64)]) -> BeginBlockRequest {
    BeginBlockRequest {
        header: Header { height, proposer_address: votes.first().map(|(a, _)| *a).unwrap_or_default() },
        last_commit_votes: votes
            .iter()
            .map(|(address, power)| VoteInfo {
                validator: ConsensusValidator { address: *address, power: *power },
                signed_last_block: true,
            })
            .collect(),
        byzantine_validators: Vec::new(),
    }
}
