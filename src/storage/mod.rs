use crate::alias_ledger::AliasMap;
use crate::stages::MigrationStage;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod file;
pub use file::FileStorage;

/// Progress markers kept between invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_step: Option<MigrationStage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_directory: Option<PathBuf>,
    /// Last shard file whose messages were all delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_json_imported: Option<PathBuf>,
}

// ============================================================================
// Storage trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait Storage: Send + Sync {
    async fn get_state(&self) -> Result<MigrationState>;
    async fn set_stage(&self, stage: MigrationStage) -> Result<()>;
    async fn set_migration_directory(&self, dir: &Path) -> Result<()>;
    async fn set_last_json_imported(&self, path: &Path) -> Result<()>;

    /// `None` when nothing has ever been persisted.
    async fn load_aliases(&self) -> Result<Option<AliasMap>>;
    /// Replaces the stored ledger wholesale.
    async fn save_aliases(&self, aliases: &AliasMap) -> Result<()>;
    async fn clear_aliases(&self) -> Result<()>;
}

// ============================================================================
// Test utilities: InMemoryStorage for in-crate tests
// ============================================================================
