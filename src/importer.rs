//! Delivers a directory of Amplitude shard files to PostHog.

use crate::alias_ledger::AliasLedger;
use crate::batcher::Batcher;
use crate::delivery::Delivery;
use crate::error::ImportHalted;
use crate::stages::MigrationStage;
use crate::storage::Storage;
use crate::translator::Translator;
use crate::types::SourceEvent;
use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub batch_size: usize,
    /// Skip shard files that sort before the stored checkpoint. The
    /// checkpointed file itself is read again.
    pub resume: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            resume: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub event_count: usize,
    pub alias_count: usize,
    pub batch_count: usize,
    pub file_count: usize,
    /// Events sent without a distinct id; PostHog decides what to do with them.
    pub missing_identity_count: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events and {} aliases from {} files in {} batches",
            self.event_count, self.alias_count, self.file_count, self.batch_count
        )
    }
}

pub struct Importer<S, D> {
    storage: Arc<S>,
    delivery: Arc<D>,
    translator: Translator,
    ledger: AliasLedger,
    options: ImportOptions,
}

impl<S: Storage, D: Delivery> Importer<S, D> {
    pub fn new(
        storage: Arc<S>,
        delivery: Arc<D>,
        ledger: AliasLedger,
        options: ImportOptions,
    ) -> Self {
        Self {
            storage,
            delivery,
            translator: Translator::default(),
            ledger,
            options,
        }
    }

    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = translator;
        self
    }

    pub fn ledger(&self) -> &AliasLedger {
        &self.ledger
    }

    /// Import every shard file in `json_dir`, then persist the alias ledger.
    ///
    /// On failure the ledger forgets pairs whose announcements were never
    /// delivered before it is persisted, so stored state only reflects
    /// delivered batches.
    pub async fn run(&mut self, json_dir: &Path) -> Result<ImportSummary, ImportHalted> {
        let mut summary = ImportSummary::default();
        let outcome = self.import_dir(json_dir, &mut summary).await;

        if outcome.is_err() {
            let forgotten = self.ledger.rollback_uncommitted();
            if forgotten > 0 {
                warn!(pairs = forgotten, "Dropped undelivered alias pairs from ledger");
            }
        }
        let persisted = self.ledger.persist(self.storage.as_ref()).await;

        let failure = match (outcome, persisted) {
            (Ok(()), Ok(())) => {
                info!(
                    events = summary.event_count,
                    aliases = summary.alias_count,
                    batches = summary.batch_count,
                    files = summary.file_count,
                    "Import complete"
                );
                return Ok(summary);
            }
            (Err(e), Ok(())) => e,
            (Err(e), Err(persist_error)) => {
                error!(error = %persist_error, "Failed to persist alias ledger");
                e
            }
            (Ok(()), Err(persist_error)) => persist_error,
        };

        Err(ImportHalted {
            stage: MigrationStage::PostHogImport,
            progress: summary,
            source: failure,
        })
    }

    async fn import_dir(&mut self, json_dir: &Path, summary: &mut ImportSummary) -> Result<()> {
        let mut files = list_shard_files(json_dir).await?;
        if self.options.resume {
            if let Some(checkpoint) = self.storage.get_state().await?.last_json_imported {
                files = files_from_checkpoint(json_dir, files, &checkpoint)?;
                info!(
                    checkpoint = %checkpoint.display(),
                    remaining = files.len(),
                    "Resuming from checkpoint"
                );
            }
        }

        let mut batcher = Batcher::new(self.options.batch_size);
        // Latest file fully read but with messages still buffered.
        let mut completed: Option<PathBuf> = None;

        for (index, path) in files.iter().enumerate() {
            let is_last_file = index + 1 == files.len();
            let records = read_shard(path).await?;
            debug!(file = %path.display(), records = records.len(), "Read shard file");

            for record in &records {
                let translation = self
                    .translator
                    .translate(record, &mut self.ledger)
                    .with_context(|| format!("Failed to translate event in {}", path.display()))?;

                summary.event_count += 1;
                summary.alias_count += translation.aliases.len();
                if translation.event.distinct_id.is_none() {
                    summary.missing_identity_count += 1;
                    warn!(
                        file = %path.display(),
                        event = %translation.event.event,
                        "Event has neither user_id nor device_id"
                    );
                }

                for message in translation.into_messages() {
                    batcher.offer(message);
                    if batcher.should_flush(false) {
                        let committed = completed.take();
                        self.flush(&mut batcher, committed.as_deref(), summary).await?;
                    }
                }
            }
            summary.file_count += 1;

            if batcher.is_empty() {
                // everything this file produced has already gone out
                self.checkpoint(path).await?;
            } else if batcher.should_flush(is_last_file) {
                self.flush(&mut batcher, Some(path.as_path()), summary).await?;
            } else {
                completed = Some(path.clone());
            }
        }

        Ok(())
    }

    /// Deliver the buffer, then advance the checkpoint, then clear the buffer.
    async fn flush(
        &mut self,
        batcher: &mut Batcher,
        completed: Option<&Path>,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        self.delivery
            .deliver(batcher.pending())
            .await
            .with_context(|| format!("Failed to deliver batch {}", summary.batch_count + 1))?;
        summary.batch_count += 1;
        self.ledger.commit();

        if let Some(path) = completed {
            self.checkpoint(path).await?;
        }
        let delivered = batcher.drain();
        info!(
            batch = summary.batch_count,
            messages = delivered.len(),
            "Delivered batch"
        );
        Ok(())
    }

    async fn checkpoint(&self, path: &Path) -> Result<()> {
        self.storage.set_last_json_imported(path).await?;
        debug!(file = %path.display(), "Checkpoint advanced");
        Ok(())
    }
}

/// `*.json` files directly inside `dir`, sorted by file name.
pub async fn list_shard_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Drops files that sort before the checkpointed one. A checkpoint left by
/// an import of some other directory is an error.
fn files_from_checkpoint(
    json_dir: &Path,
    files: Vec<PathBuf>,
    checkpoint: &Path,
) -> Result<Vec<PathBuf>> {
    let Some(checkpoint_name) = checkpoint.file_name() else {
        return Ok(files);
    };
    if checkpoint.parent() != Some(json_dir) {
        anyhow::bail!(
            "Checkpoint {} does not belong to {}, import it without resuming",
            checkpoint.display(),
            json_dir.display()
        );
    }
    Ok(files
        .into_iter()
        .filter(|path| path.file_name().is_some_and(|name| name >= checkpoint_name))
        .collect())
}

async fn read_shard(path: &Path) -> Result<Vec<SourceEvent>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}
