//! Validator Set Node Application
//!
//! This crate wires the `protocol-identity` validator set subsystem into the
//! block lifecycle a consensus engine drives: init-chain, begin-block,
//! transaction check/deliver, end-block and commit. It also carries the
//! node's layered configuration, logging setup and the scenario format used
//! by the `valset-replay` binary.
//!
//! ## Features
//!
//! - **tracing-subscriber** (default): installs a `fmt` subscriber with an
//!   `EnvFilter` through [`logging::init_tracing`]
//!
//! ## Usage
//!
//! ```rust
//! use protocol_identity::{EndBlockRequest, IdentityConfig};
//! use protocol_node::{Application, NodeConfig};
//!
//! let config = NodeConfig::default();
//! let mut app = Application::new(config)?;
//!
//! let currencies = protocol_identity::staking_currencies(&IdentityConfig::default());
//! app.init_chain(&[], &currencies)?;
//!
//! let response = app.end_block(&EndBlockRequest { height: 0 })?;
//! assert!(response.validator_updates.is_empty());
//!
//! let commit = app.commit()?;
//! assert_eq!(commit.version, 1);
//! # Ok::<(), protocol_node::NodeError>(())
//! ```

#![warn(clippy::all)]

pub mod app;
pub mod config;
pub mod logging;
pub mod router;
pub mod scenario;

pub use app::{Application, EndBlockResponse};
pub use config::NodeConfig;
pub use router::{RawTx, Router, Transaction, TxResult};
pub use scenario::{BlockOutcome, Scenario, ScenarioBlock};

pub mod error {
    //! Error types for the node application

    use protocol_identity::IdentityError;

    /// Errors raised while driving the block lifecycle
    #[derive(Debug, thiserror::Error)]
    pub enum NodeError {
        /// Validator set subsystem error
        #[error("identity error: {0}")]
        Identity(#[from] IdentityError),

        /// Configuration could not be loaded
        #[error("configuration error: {0}")]
        Config(#[from] ::config::ConfigError),

        /// Configuration could not be encoded
        #[error("configuration encoding error: {0}")]
        ConfigEncode(#[from] toml::ser::Error),

        /// Transaction failed stateless validation
        #[error("invalid transaction: {0}")]
        InvalidTransaction(String),

        /// Scenario file is malformed
        #[error("invalid scenario: {0}")]
        InvalidScenario(String),

        /// The application stopped after the validator set diverged from the
        /// consensus engine
        #[error("node halted: {0}")]
        Halted(String),

        /// I/O error
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        /// JSON error
        #[error("serialization error: {0}")]
        Json(#[from] serde_json::Error),
    }

    impl NodeError {
        /// Errors that must stop block processing rather than reject a single
        /// transaction.
        pub fn is_fatal(&self) -> bool {
            match self {
                NodeError::Identity(err) => err.is_fatal(),
                NodeError::InvalidTransaction(_) => false,
                _ => true,
            }
        }
    }

    /// Result type for node operations
    pub type NodeResult<T> = Result<T, NodeError>;
}

pub use error::{NodeError, NodeResult};

pub mod prelude {
    //! Commonly used types from both crates

    pub use crate::app::{Application, EndBlockResponse};
    pub use crate::config::NodeConfig;
    pub use crate::error::{NodeError, NodeResult};
    pub use crate::router::{RawTx, Transaction, TxResult};

    pub use protocol_identity::{
        BeginBlockRequest, CommitInfo, EndBlockRequest, GenesisValidator, IdentityConfig, Stake, Unstake,
        ValidatorUpdate,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_info() -> String {
    format!("protocol-node {}", VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol_identity::IdentityError;

    #[test]
    fn test_version_info() {
        assert!(version_info().starts_with("protocol-node "));
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_fatal_classification() {
        let mismatch = NodeError::from(IdentityError::ValidatorSetMismatch { reason: "x".to_string() });
        assert!(mismatch.is_fatal());

        let rejected = NodeError::from(IdentityError::UnregisteredStakeToken("VT".to_string()));
        assert!(!rejected.is_fatal());

        assert!(!NodeError::InvalidTransaction("fee".to_string()).is_fatal());
        assert!(NodeError::Halted("diverged".to_string()).is_fatal());
    }
}
