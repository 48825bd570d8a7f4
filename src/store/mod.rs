//! Persistent state on an embedded fjall keyspace.
//!
//! One partition per record kind. Values are JSON; keys are laid out so
//! that a prefix scan returns the rows of one owner in a useful order:
//!
//! | partition             | key                                         |
//! |-----------------------|---------------------------------------------|
//! | `funds`               | fund code                                   |
//! | `holdings`            | fund code, `0x00`, position in report (u32) |
//! | `portfolios`          | portfolio id (u64 BE)                       |
//! | `positions`           | portfolio id (u64 BE), lot id (u64 BE)      |
//! | `estimate_snapshots`  | fund code, `0x00`, date, `0x00`, time       |
//! | `portfolio_snapshots` | portfolio id (u64 BE), date                 |
//! | `meta`                | sequence name                               |
//!
//! Portfolio snapshots are keyed by (portfolio, date), so writing one is
//! an atomic insert-or-replace.

mod funds;
mod portfolios;

use anyhow::{Context, Result, anyhow};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

const SEPARATOR: u8 = 0;

pub struct FundStore {
    keyspace: Keyspace,
    funds: PartitionHandle,
    holdings: PartitionHandle,
    portfolios: PartitionHandle,
    positions: PartitionHandle,
    estimate_snapshots: PartitionHandle,
    portfolio_snapshots: PartitionHandle,
    meta: PartitionHandle,
    sequence_lock: Mutex<()>,
}

impl FundStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create store directory: {}", path.display()))?;
        let keyspace = Config::new(path)
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;

        let open = |name: &str| -> Result<PartitionHandle> {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .with_context(|| format!("Failed to open partition: {name}"))
        };

        let store = Self {
            funds: open("funds")?,
            holdings: open("holdings")?,
            portfolios: open("portfolios")?,
            positions: open("positions")?,
            estimate_snapshots: open("estimate_snapshots")?,
            portfolio_snapshots: open("portfolio_snapshots")?,
            meta: open("meta")?,
            keyspace,
            sequence_lock: Mutex::new(()),
        };
        debug!("Opened store at {}", path.display());
        Ok(store)
    }

    /// Allocates the next id of a named sequence, starting at 1.
    fn next_id(&self, sequence: &str) -> Result<u64> {
        let _guard = self
            .sequence_lock
            .lock()
            .map_err(|_| anyhow!("Sequence lock poisoned"))?;
        let key = format!("seq:{sequence}");
        let current = match self.meta.get(key.as_bytes())? {
            Some(bytes) => decode::<u64>(&bytes)?,
            None => 0,
        };
        let next = current + 1;
        self.meta.insert(key.into_bytes(), encode(&next)?)?;
        Ok(next)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).context("Failed to encode record")
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).context("Failed to decode record")
}

fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

fn compound_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEPARATOR);
        }
        key.extend_from_slice(part);
    }
    key
}

/// Prefix that matches every compound key whose first part is `owner`.
fn owner_prefix(owner: &str) -> Vec<u8> {
    let mut prefix = owner.as_bytes().to_vec();
    prefix.push(SEPARATOR);
    prefix
}

fn scan_prefix<T: DeserializeOwned>(partition: &PartitionHandle, prefix: &[u8]) -> Result<Vec<T>> {
    partition
        .prefix(prefix)
        .map(|item| {
            let (_, value) = item?;
            decode(&value)
        })
        .collect()
}

fn scan_keys(partition: &PartitionHandle, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
    partition
        .prefix(prefix)
        .map(|item| Ok(item?.0.to_vec()))
        .collect()
}

fn scan_all<T: DeserializeOwned>(partition: &PartitionHandle) -> Result<Vec<T>> {
    partition
        .iter()
        .map(|item| {
            let (_, value) = item?;
            decode(&value)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::FundStore;
    use tempfile::TempDir;

    /// Store in a temporary directory that lives as long as the returned guard.
    pub fn temp_store() -> (TempDir, FundStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FundStore::open(dir.path()).unwrap();
        (dir, store)
    }
}
