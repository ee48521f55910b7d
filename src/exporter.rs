use crate::config::ExportConfig;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::info;

const EXPORT_PATH: &str = "/api/2/export";
const EXPORT_FILE_NAME: &str = "export.zip";

#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub dir: PathBuf,
    pub zip_path: PathBuf,
}

/// Downloads raw event archives from the Amplitude Export API.
pub struct AmplitudeExporter {
    http_client: Client,
    api_host: String,
    api_key: String,
    secret_key: String,
}

impl AmplitudeExporter {
    pub fn new(api_host: &str, api_key: String, secret_key: String) -> Self {
        Self {
            http_client: Client::new(),
            api_host: api_host.trim_end_matches('/').to_string(),
            api_key,
            secret_key,
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(
            &config.api_host,
            config.api_key.clone(),
            config.secret_key.clone(),
        )
    }

    pub fn export_url(&self, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}{}?start={}&end={}",
            self.api_host,
            EXPORT_PATH,
            export_hour(start, 0),
            export_hour(end, 23)
        )
    }

    /// Download every event between the start of `start` and the last hour of
    /// `end` into `<exports_root>/<timestamp>/export.zip`.
    pub async fn export(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        exports_root: &Path,
    ) -> Result<ExportResult> {
        let url = self.export_url(start, end);
        info!(%url, "Requesting Amplitude export, this can take some time");

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.api_key, Some(&self.secret_key))
            .send()
            .await
            .context("Amplitude export request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
            anyhow::bail!(
                "Unexpected response code from Amplitude Export API. Status: {} Body: {}",
                status,
                body
            );
        }

        let archive = response
            .bytes()
            .await
            .context("Failed to download Amplitude export")?;
        info!(bytes = archive.len(), "Download complete");

        let dir = exports_root.join(Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let zip_path = dir.join(EXPORT_FILE_NAME);
        tokio::fs::write(&zip_path, &archive)
            .await
            .with_context(|| format!("Failed to write {}", zip_path.display()))?;

        info!(path = %zip_path.display(), "Export written");
        Ok(ExportResult { dir, zip_path })
    }
}

/// `YYYYMMDDTHH`, the hour format the Export API expects.
pub fn export_hour(date: NaiveDate, hour: u32) -> String {
    format!("{}T{:02}", date.format("%Y%m%d"), hour)
}
