//! # Protocol Identity - Validator Set Management
//!
//! This library tracks which nodes are authorized consensus participants,
//! their voting power, and how staking transactions and byzantine evidence
//! change that power. At the end of every block it produces the ordered
//! list of voting power changes handed to the consensus engine.
//!
//! Every replica must derive byte-identical state from the same ordered
//! inputs, so nothing here iterates unordered collections, reads clocks or
//! suspends.
//!
//! ## Architecture
//!
//! - **State**: versioned key-value tree with staged writes and hashed commits
//! - **Queue**: pending power changes, min-ordered on `(priority, address)`
//! - **Registry**: address -> validator records stored in the state tree
//! - **Manager**: genesis, begin-block reconciliation, stake/unstake,
//!   end-block updates and commit
//! - **Evidence**: zeroes the power of byzantine validators
//!
//! ## Usage
//!
//! ```rust
//! use protocol_identity::{
//!     Address, Coin, Currency, EndBlockRequest, IdentityConfig, MemoryTree, PublicKey, Stake,
//!     ValidatorSetManager,
//! };
//!
//! let mut manager = ValidatorSetManager::new(IdentityConfig::default(), MemoryTree::new())?;
//!
//! let address = Address::from([1u8; 20]);
//! manager.handle_stake(&Stake {
//!     validator_address: address,
//!     stake_address: address,
//!     public_key: PublicKey::ed25519(vec![1u8; 32]),
//!     name: "validator-1".to_string(),
//!     amount: Coin::new(Currency::new("VT"), 500u64),
//! })?;
//!
//! let updates = manager.get_end_block_update(&EndBlockRequest { height: 0 });
//! assert_eq!(updates[0].power, 500);
//!
//! let commit = manager.commit()?;
//! assert_eq!(commit.version, 1);
//! # Ok::<(), protocol_identity::IdentityError>(())
//! ```

pub mod amount;
pub mod commit;
pub mod config;
pub mod consensus;
pub mod error;
pub mod evidence;
pub mod keys;
pub mod manager;
pub mod power;
pub mod queue;
pub mod registry;
pub mod state;
pub mod validator;

pub use amount::{Amount, Coin, Currency, CurrencyList};
pub use commit::CommitInfo;
pub use config::IdentityConfig;
pub use consensus::{
    BeginBlockRequest, ConsensusValidator, EndBlockRequest, Evidence, GenesisValidator, Header, VoteInfo,
};
pub use error::{IdentityError, IdentityResult};
pub use keys::{Address, KeyAlgorithm, PublicKey};
pub use manager::{ManagerState, ValidatorSetManager};
pub use queue::{QueueEntry, ValidatorQueue};
pub use registry::ValidatorRegistry;
pub use state::{MemoryTree, RootHash, StateTree};
pub use validator::{Stake, Unstake, Validator, ValidatorUpdate, Withdrawal};

/// Currency list holding only the configured staking token, the common
/// genesis setup.
pub fn staking_currencies(config: &IdentityConfig) -> CurrencyList {
    std::iter::once(config.staking_currency()).collect()
}
