use crate::storage::Storage;
use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Migration stages in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MigrationStage {
    Init,
    AmplitudeExport,
    AmplitudeUnzip,
    PostHogImport,
    Complete,
}

impl MigrationStage {
    pub fn all() -> [MigrationStage; 5] {
        [
            Self::Init,
            Self::AmplitudeExport,
            Self::AmplitudeUnzip,
            Self::PostHogImport,
            Self::Complete,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::AmplitudeExport => "AMPLITUDE_EXPORT",
            Self::AmplitudeUnzip => "AMPLITUDE_UNZIP",
            Self::PostHogImport => "POSTHOG_IMPORT",
            Self::Complete => "COMPLETE",
        }
    }
}

impl FromStr for MigrationStage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid migration stage: {}", s))
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MigrationStage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MigrationStage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MigrationStage::from_str(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// StageTracker
// ============================================================================

/// Moves a run through the stages, persisting each transition. Only forward
/// moves are allowed; a failed stage leaves the stored marker where it was.
pub struct StageTracker<'a, S> {
    storage: &'a S,
    current: MigrationStage,
}

impl<'a, S: Storage> StageTracker<'a, S> {
    /// Starts a new run at `Init`.
    pub async fn begin(storage: &'a S) -> Result<Self> {
        storage.set_stage(MigrationStage::Init).await?;
        info!(stage = %MigrationStage::Init, "Migration stage");
        Ok(Self {
            storage,
            current: MigrationStage::Init,
        })
    }

    pub fn current(&self) -> MigrationStage {
        self.current
    }

    pub async fn advance(&mut self, next: MigrationStage) -> Result<()> {
        if next <= self.current {
            anyhow::bail!(
                "Cannot move migration from {} back to {}",
                self.current,
                next
            );
        }
        self.storage.set_stage(next).await?;
        self.current = next;
        info!(stage = %next, "Migration stage");
        Ok(())
    }
}
