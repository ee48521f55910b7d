use crate::importer::ImportSummary;
use crate::stages::MigrationStage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("Invalid event timestamp: {value}")]
    InvalidTimestamp { value: String },
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Unexpected response code from PostHog API. Status: {code} Body: {body}")]
    UnexpectedStatus { code: u16, body: String },

    #[error("PostHog request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A run that stopped part-way. Everything counted in `progress` was
/// translated; only batches counted in `progress.batch_count` were delivered.
#[derive(Error, Debug)]
#[error("Import halted during {stage} after {progress}")]
pub struct ImportHalted {
    pub stage: MigrationStage,
    pub progress: ImportSummary,
    #[source]
    pub source: anyhow::Error,
}
