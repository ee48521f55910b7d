use super::{MigrationState, Storage};
use crate::alias_ledger::AliasMap;
use crate::stages::MigrationStage;
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const STATE_FILE_NAME: &str = "migration.conf";
const ALIAS_FILE_NAME: &str = "alias.conf";

// ============================================================================
// FileStorage: JSON files in a state directory
// ============================================================================

pub struct FileStorage {
    state_path: PathBuf,
    alias_path: PathBuf,
    // Serializes read-modify-write of the state file.
    state_lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state_path: dir.join(STATE_FILE_NAME),
            alias_path: dir.join(ALIAS_FILE_NAME),
            state_lock: Mutex::new(()),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn alias_path(&self) -> &Path {
        &self.alias_path
    }

    async fn update_state(&self, apply: impl FnOnce(&mut MigrationState)) -> Result<()> {
        let _guard = self.state_lock.lock().await;
        let mut state = read_json::<MigrationState>(&self.state_path)
            .await?
            .unwrap_or_default();
        apply(&mut state);
        write_json(&self.state_path, &state).await
    }
}

impl Storage for FileStorage {
    async fn get_state(&self) -> Result<MigrationState> {
        Ok(read_json(&self.state_path).await?.unwrap_or_default())
    }

    async fn set_stage(&self, stage: MigrationStage) -> Result<()> {
        self.update_state(|state| state.migration_step = Some(stage))
            .await
            .context("Failed to record migration stage")
    }

    async fn set_migration_directory(&self, dir: &Path) -> Result<()> {
        self.update_state(|state| state.migration_directory = Some(dir.to_path_buf()))
            .await
            .context("Failed to record migration directory")
    }

    async fn set_last_json_imported(&self, path: &Path) -> Result<()> {
        self.update_state(|state| state.last_json_imported = Some(path.to_path_buf()))
            .await
            .context("Failed to record checkpoint")
    }

    async fn load_aliases(&self) -> Result<Option<AliasMap>> {
        read_json(&self.alias_path).await
    }

    async fn save_aliases(&self, aliases: &AliasMap) -> Result<()> {
        write_json(&self.alias_path, aliases)
            .await
            .context("Failed to save alias ledger")
    }

    async fn clear_aliases(&self) -> Result<()> {
        match fs::remove_file(&self.alias_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove {}", self.alias_path.display())),
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Writes to a sibling temp file and renames it over `path`, so readers see
/// either the old contents or the new ones.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("conf.tmp");
    fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
