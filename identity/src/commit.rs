//! Block finalization against the state tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::error::IdentityResult;
use crate::state::{RootHash, StateTree};

/// Result of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: RootHash,
    pub version: u64,
}

impl CommitInfo {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl fmt::Display for CommitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} {}", self.version, self.hash_hex())
    }
}

pub fn commit_tree<S: StateTree>(tree: &mut S) -> IdentityResult<CommitInfo> {
    let (hash, version) = tree.commit()?;
    let info = CommitInfo { hash, version };
    info!(version, hash = %info.hash_hex(), "state committed");
    Ok(info)
}
