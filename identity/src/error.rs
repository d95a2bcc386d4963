//! Error taxonomy for the validator set subsystem.
//!
//! Errors fall in two groups. Consistency and storage failures abort the
//! block being processed; everything else rejects a single transaction and
//! leaves the block running. [`IdentityError::is_fatal`] tells them apart.

use crate::keys::Address;

/// Errors produced by validator set operations
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Local active set and the engine's last-commit votes disagree
    #[error("validator set not match to last commit: {reason}")]
    ValidatorSetMismatch {
        /// First discrepancy found, in address order
        reason: String,
    },

    /// Amount is tagged with a currency other than the staking token
    #[error("invalid currency: expected {expected}, found {found}")]
    InvalidCurrency {
        /// Configured staking currency
        expected: String,
        /// Currency carried by the transaction
        found: String,
    },

    /// Public key uses an algorithm other than ed25519
    #[error("invalid pubkey type: provided invalid key algorithm {0:?}")]
    InvalidKeyAlgorithm(String),

    /// Public key bytes are not a valid key for its algorithm
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Staking currency is missing from the currency registry
    #[error("stake token not registered: {0}")]
    UnregisteredStakeToken(String),

    /// No registry entry exists for the address
    #[error("validator entry not found: {0}")]
    EntryNotFound(Address),

    /// Unstake would drive the staked amount below zero
    #[error("insufficient stake for {address}: staked {staked}, requested {requested}")]
    InsufficientStake {
        /// Validator address
        address: Address,
        /// Currently staked amount
        staked: String,
        /// Amount requested for withdrawal
        requested: String,
    },

    /// Computed voting power does not fit the engine's power domain
    #[error("voting power overflow for stake {0}")]
    PowerOverflow(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Stored record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying store I/O failure
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IdentityError {
    /// Whether the error must abort block processing rather than a single
    /// transaction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IdentityError::ValidatorSetMismatch { .. }
                | IdentityError::Serialization(_)
                | IdentityError::Io(_)
        )
    }
}

impl From<bincode::Error> for IdentityError {
    fn from(err: bincode::Error) -> Self {
        IdentityError::Serialization(err.to_string())
    }
}

/// Result type for validator set operations
pub type IdentityResult<T> = Result<T, IdentityError>;
