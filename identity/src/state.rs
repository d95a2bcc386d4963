//! Versioned key-value state.
//!
//! Writes land in a staged overlay that later reads in the same version
//! observe. `commit` folds the overlay into the durable map, advances the
//! version and returns the content hash. `rollback` drops the overlay.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::IdentityResult;

/// Root hash of a committed version
pub type RootHash = [u8; 32];

/// Copy-on-write store consumed by the registry
pub trait StateTree {
    fn get(&self, key: &[u8]) -> IdentityResult<Option<Vec<u8>>>;

    /// Reads the last committed version only, ignoring staged writes.
    fn get_committed(&self, key: &[u8]) -> IdentityResult<Option<Vec<u8>>>;

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> IdentityResult<()>;

    fn delete(&mut self, key: &[u8]) -> IdentityResult<()>;

    /// Every live entry under `prefix`, in ascending key order, staged
    /// writes included.
    fn iter_prefix(&self, prefix: &[u8]) -> IdentityResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Makes staged writes durable. Returns the new root hash and version.
    fn commit(&mut self) -> IdentityResult<(RootHash, u64)>;

    /// Discards staged writes.
    fn rollback(&mut self);

    /// Last committed version, 0 before the first commit.
    fn version(&self) -> u64;

    /// Hash of the last committed version.
    fn root_hash(&self) -> RootHash;
}

/// In-memory [`StateTree`] with optional on-disk snapshots
#[derive(Debug, Clone)]
pub struct MemoryTree {
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    version: u64,
    hash: RootHash,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u64,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl MemoryTree {
    pub fn new() -> Self {
        let committed = BTreeMap::new();
        let hash = content_hash(&committed);
        Self { committed, staged: BTreeMap::new(), version: 0, hash }
    }

    pub fn has_staged_writes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Writes the last committed version to `path`. Staged writes are not
    /// included.
    pub fn save_snapshot(&self, path: &Path) -> IdentityResult<()> {
        let snapshot = Snapshot {
            version: self.version,
            entries: self.committed.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bincode::serialize(&snapshot)?)?;
        debug!(version = self.version, path = %path.display(), "state snapshot saved");
        Ok(())
    }

    pub fn load_snapshot(path: &Path) -> IdentityResult<Self> {
        let bytes = fs::read(path)?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)?;
        let committed: BTreeMap<_, _> = snapshot.entries.into_iter().collect();
        let hash = content_hash(&committed);
        info!(version = snapshot.version, entries = committed.len(), "state snapshot loaded");
        Ok(Self { committed, staged: BTreeMap::new(), version: snapshot.version, hash })
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTree for MemoryTree {
    fn get(&self, key: &[u8]) -> IdentityResult<Option<Vec<u8>>> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.committed.get(key).cloned())
    }

    fn get_committed(&self, key: &[u8]) -> IdentityResult<Option<Vec<u8>>> {
        Ok(self.committed.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> IdentityResult<()> {
        self.staged.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> IdentityResult<()> {
        self.staged.insert(key.to_vec(), None);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> IdentityResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .committed
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (key, value) in self.staged.range(prefix.to_vec()..).take_while(|(k, _)| k.starts_with(prefix)) {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    fn commit(&mut self) -> IdentityResult<(RootHash, u64)> {
        let staged = std::mem::take(&mut self.staged);
        for (key, value) in staged {
            match value {
                Some(v) => {
                    self.committed.insert(key, v);
                }
                None => {
                    self.committed.remove(&key);
                }
            }
        }
        self.version += 1;
        self.hash = content_hash(&self.committed);
        Ok((self.hash, self.version))
    }

    fn rollback(&mut self) {
        if !self.staged.is_empty() {
            debug!(discarded = self.staged.len(), "rolling back staged writes");
        }
        self.staged.clear();
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn root_hash(&self) -> RootHash {
        self.hash
    }
}

fn content_hash(entries: &BTreeMap<Vec<u8>, Vec<u8>>) -> RootHash {
    let mut hasher = Sha256::new();
    for (key, value) in entries {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key);
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_reads_visible_before_commit() {
        let mut tree = MemoryTree::new();
        tree.set(b"a/1", vec![1]).unwrap();
        assert_eq!(tree.get(b"a/1").unwrap(), Some(vec![1]));
        assert_eq!(tree.get_committed(b"a/1").unwrap(), None);
        assert_eq!(tree.version(), 0);
    }

    #[test]
    fn test_rollback_discards_staged_writes() {
        let mut tree = MemoryTree::new();
        tree.set(b"a/1", vec![1]).unwrap();
        tree.commit().unwrap();

        tree.set(b"a/1", vec![2]).unwrap();
        tree.set(b"a/2", vec![3]).unwrap();
        tree.rollback();

        assert_eq!(tree.get(b"a/1").unwrap(), Some(vec![1]));
        assert_eq!(tree.get(b"a/2").unwrap(), None);
    }

    #[test]
    fn test_commit_versions_increase() {
        let mut tree = MemoryTree::new();
        let (hash1, v1) = tree.commit().unwrap();
        let (hash2, v2) = tree.commit().unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert_eq!(hash1, hash2);

        tree.set(b"k", vec![0]).unwrap();
        let (hash3, v3) = tree.commit().unwrap();
        assert_eq!(v3, 3);
        assert_ne!(hash3, hash2);
    }

    #[test]
    fn test_prefix_iteration_merges_overlay() {
        let mut tree = MemoryTree::new();
        tree.set(b"a/1", vec![1]).unwrap();
        tree.set(b"a/2", vec![2]).unwrap();
        tree.set(b"b/1", vec![9]).unwrap();
        tree.commit().unwrap();

        tree.delete(b"a/1").unwrap();
        tree.set(b"a/0", vec![0]).unwrap();

        let keys: Vec<_> = tree.iter_prefix(b"a/").unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a/0".to_vec(), b"a/2".to_vec()]);
    }

    #[test]
    fn test_same_content_same_hash() {
        let mut left = MemoryTree::new();
        let mut right = MemoryTree::new();
        left.set(b"x", vec![1]).unwrap();
        left.set(b"y", vec![2]).unwrap();
        right.set(b"y", vec![2]).unwrap();
        right.set(b"x", vec![1]).unwrap();
        assert_eq!(left.commit().unwrap(), right.commit().unwrap());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("snapshot.bin");

        let mut tree = MemoryTree::new();
        tree.set(b"v/1", vec![7]).unwrap();
        let (hash, version) = tree.commit().unwrap();
        tree.set(b"v/2", vec![8]).unwrap();
        tree.save_snapshot(&path).unwrap();

        let restored = MemoryTree::load_snapshot(&path).unwrap();
        assert_eq!(restored.version(), version);
        assert_eq!(restored.root_hash(), hash);
        assert_eq!(restored.get(b"v/2").unwrap(), None);
        assert!(!restored.has_staged_writes());
    }
}
