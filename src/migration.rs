//! Runs the migration commands, recording each stage transition before the
//! stage's work starts.

use crate::alias_ledger::AliasLedger;
use crate::delivery::Delivery;
use crate::exporter::{AmplitudeExporter, ExportResult};
use crate::importer::{ImportOptions, ImportSummary, Importer};
use crate::stages::{MigrationStage, StageTracker};
use crate::storage::Storage;
use crate::unzip::{UnzipSummary, unzip_export};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

#[derive(Debug, Clone, PartialEq)]
pub struct FullExportReport {
    pub export: ExportResult,
    pub unzip: UnzipSummary,
    pub import: ImportSummary,
}

pub struct Migration<S, D> {
    storage: Arc<S>,
    delivery: Arc<D>,
    options: ImportOptions,
}

impl<S: Storage, D: Delivery> Migration<S, D> {
    pub fn new(storage: Arc<S>, delivery: Arc<D>, options: ImportOptions) -> Self {
        Self {
            storage,
            delivery,
            options,
        }
    }

    /// Export from Amplitude, unpack the archive, then import it into PostHog.
    pub async fn full_export(
        &self,
        exporter: &AmplitudeExporter,
        start: NaiveDate,
        end: NaiveDate,
        exports_root: &Path,
    ) -> Result<FullExportReport> {
        let mut stages = StageTracker::begin(self.storage.as_ref()).await?;

        stages.advance(MigrationStage::AmplitudeExport).await?;
        let export = exporter
            .export(start, end, exports_root)
            .instrument(stage_span(MigrationStage::AmplitudeExport))
            .await?;
        self.storage.set_migration_directory(&export.dir).await?;

        stages.advance(MigrationStage::AmplitudeUnzip).await?;
        let unzip = unzip_export(&export.zip_path)
            .instrument(stage_span(MigrationStage::AmplitudeUnzip))
            .await?;
        info!(events = unzip.event_count, "Will send events to PostHog");

        stages.advance(MigrationStage::PostHogImport).await?;
        let import = self.import(&unzip.json_dir).await?;

        stages.advance(MigrationStage::Complete).await?;
        Ok(FullExportReport {
            export,
            unzip,
            import,
        })
    }

    /// Import an already unpacked export directory.
    pub async fn posthog_import_only(&self, json_dir: &Path) -> Result<ImportSummary> {
        let mut stages = StageTracker::begin(self.storage.as_ref()).await?;
        stages.advance(MigrationStage::PostHogImport).await?;
        let import = self.import(json_dir).await?;
        stages.advance(MigrationStage::Complete).await?;
        Ok(import)
    }

    async fn import(&self, json_dir: &Path) -> Result<ImportSummary> {
        let ledger = AliasLedger::load(self.storage.as_ref()).await?;
        let mut importer = Importer::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.delivery),
            ledger,
            self.options,
        );
        let summary = importer
            .run(json_dir)
            .instrument(stage_span(MigrationStage::PostHogImport))
            .await?;
        Ok(summary)
    }
}

/// Unpack an export archive without importing it. The stored stage is left
/// at `AMPLITUDE_UNZIP`.
pub async fn unzip_only<S: Storage>(storage: &S, zip_path: &Path) -> Result<UnzipSummary> {
    let mut stages = StageTracker::begin(storage).await?;
    stages.advance(MigrationStage::AmplitudeUnzip).await?;
    unzip_export(zip_path)
        .instrument(stage_span(MigrationStage::AmplitudeUnzip))
        .await
}

fn stage_span(stage: MigrationStage) -> tracing::Span {
    info_span!("stage", name = %stage)
}
