//! Settings read from the environment.

use crate::importer::{DEFAULT_BATCH_SIZE, ImportOptions};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_AMPLITUDE_API_HOST: &str = "https://amplitude.com";
const EXPORT_DATE_FORMAT: &str = "%m/%d/%Y";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub api_key: String,
    pub secret_key: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub api_host: String,
}

impl ExportConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let start_date = parse_export_date(&required(&lookup, "START_EXPORT_DATE")?)
            .context("START_EXPORT_DATE must be in the format MM/DD/YYYY")?;
        let end_date = parse_export_date(&required(&lookup, "END_EXPORT_DATE")?)
            .context("END_EXPORT_DATE must be in the format MM/DD/YYYY")?;
        if end_date < start_date {
            anyhow::bail!(
                "END_EXPORT_DATE ({}) is before START_EXPORT_DATE ({})",
                end_date,
                start_date
            );
        }

        Ok(Self {
            api_key: required(&lookup, "AMPLITUDE_API_KEY")?,
            secret_key: required(&lookup, "AMPLITUDE_API_SECRET")?,
            start_date,
            end_date,
            api_host: optional(&lookup, "AMPLITUDE_API_HOST")
                .unwrap_or_else(|| DEFAULT_AMPLITUDE_API_HOST.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub api_host: String,
    pub project_api_key: String,
    pub batch_size: usize,
}

impl ImportConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let batch_size = match optional(&lookup, "POSTHOG_BATCH_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|&n| n > 0)
                .context("POSTHOG_BATCH_SIZE must be a positive number")?,
            None => DEFAULT_BATCH_SIZE,
        };

        Ok(Self {
            api_host: required(&lookup, "POSTHOG_API_HOST")?,
            project_api_key: required(&lookup, "POSTHOG_PROJECT_API_KEY")?,
            batch_size,
        })
    }

    pub fn options(&self, resume: bool) -> ImportOptions {
        ImportOptions {
            batch_size: self.batch_size,
            resume,
        }
    }
}

/// Where `migration.conf` and `alias.conf` live. Defaults to the working
/// directory.
pub fn state_dir() -> PathBuf {
    optional(&|key: &str| env::var(key).ok(), "MIGRATION_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn parse_export_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), EXPORT_DATE_FORMAT)
        .with_context(|| format!("Invalid date: {}", raw))
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    optional(lookup, key).with_context(|| format!("{} environment variable must be set", key))
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}
