use crate::storage::Storage;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Primary (user) id -> every secondary (device) id already announced.
pub type AliasMap = BTreeMap<String, BTreeSet<String>>;

/// Record of which (user, device) pairs have been announced to PostHog.
///
/// Lives in memory for the duration of a run and is written back to storage
/// wholesale at the end. Pairs registered since the last `commit` form a
/// journal so a halted run can forget announcements that never left the
/// process.
#[derive(Debug, Default, Clone)]
pub struct AliasLedger {
    entries: AliasMap,
    uncommitted: Vec<(String, String)>,
}

impl AliasLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: AliasMap) -> Self {
        Self {
            entries,
            uncommitted: Vec::new(),
        }
    }

    /// Absent storage is an empty ledger.
    pub async fn load<S: Storage>(storage: &S) -> Result<Self> {
        let ledger = storage
            .load_aliases()
            .await?
            .map(Self::from_entries)
            .unwrap_or_default();
        info!(pairs = ledger.len(), "Loaded alias ledger");
        Ok(ledger)
    }

    /// Replaces whatever the storage held with the in-memory state.
    pub async fn persist<S: Storage>(&self, storage: &S) -> Result<()> {
        storage.save_aliases(&self.entries).await?;
        info!(pairs = self.len(), "Persisted alias ledger");
        Ok(())
    }

    pub async fn clear<S: Storage>(&mut self, storage: &S) -> Result<()> {
        storage.clear_aliases().await?;
        self.entries.clear();
        self.uncommitted.clear();
        Ok(())
    }

    pub fn lookup(&self, primary: &str) -> BTreeSet<String> {
        self.entries.get(primary).cloned().unwrap_or_default()
    }

    pub fn contains(&self, primary: &str, secondary: &str) -> bool {
        self.entries
            .get(primary)
            .is_some_and(|known| known.contains(secondary))
    }

    /// Returns true if the pair was not known before.
    pub fn register(&mut self, primary: &str, secondary: &str) -> bool {
        let added = self
            .entries
            .entry(primary.to_string())
            .or_default()
            .insert(secondary.to_string());
        if added {
            self.uncommitted
                .push((primary.to_string(), secondary.to_string()));
        }
        added
    }

    /// Marks every pair registered so far as delivered.
    pub fn commit(&mut self) {
        self.uncommitted.clear();
    }

    /// Forgets pairs registered since the last `commit`. Returns how many.
    pub fn rollback_uncommitted(&mut self) -> usize {
        let count = self.uncommitted.len();
        for (primary, secondary) in self.uncommitted.drain(..) {
            if let Some(known) = self.entries.get_mut(&primary) {
                known.remove(&secondary);
                if known.is_empty() {
                    self.entries.remove(&primary);
                }
            }
        }
        count
    }

    pub fn entries(&self) -> &AliasMap {
        &self.entries
    }

    /// Number of (primary, secondary) pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
