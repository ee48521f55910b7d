//! Amplitude to PostHog migration CLI.
//!
//! Usage:
//!   ampmigrate full-export
//!   ampmigrate unzip-only <export-zip-path>
//!   ampmigrate posthog-import-only <json-directory-path> [--resume]
//!   ampmigrate status
//!
//! Progress is kept in `migration.conf` and `alias.conf` inside
//! MIGRATION_STATE_DIR (default: the current directory). Set
//! LOG_FORMAT=json for JSON log lines.

use ampmigrate::alias_ledger::AliasLedger;
use ampmigrate::config::{self, ExportConfig, ImportConfig};
use ampmigrate::delivery::PostHogClient;
use ampmigrate::exporter::AmplitudeExporter;
use ampmigrate::migration::{self, Migration};
use ampmigrate::storage::{FileStorage, Storage};
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  ampmigrate full-export
  ampmigrate unzip-only <export-zip-path>
  ampmigrate posthog-import-only <json-directory-path> [--resume]
  ampmigrate status";

enum Command {
    FullExport,
    UnzipOnly(PathBuf),
    PostHogImportOnly { json_dir: PathBuf, resume: bool },
    Status,
}

/// `None` for anything not in USAGE, including unknown or misplaced flags.
fn parse_args(args: &[String]) -> Option<Command> {
    let (flags, positional): (Vec<&str>, Vec<&str>) = args
        .iter()
        .skip(1)
        .map(String::as_str)
        .partition(|a| a.starts_with("--"));

    let resume = match flags.as_slice() {
        [] => false,
        ["--resume"] => true,
        _ => return None,
    };

    match (positional.as_slice(), resume) {
        (["full-export"], false) => Some(Command::FullExport),
        (["unzip-only", zip], false) => Some(Command::UnzipOnly(PathBuf::from(*zip))),
        (["posthog-import-only", dir], resume) => Some(Command::PostHogImportOnly {
            json_dir: PathBuf::from(*dir),
            resume,
        }),
        (["status"], false) => Some(Command::Status),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    let state_dir = config::state_dir();
    tokio::fs::create_dir_all(&state_dir)
        .await
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;
    let storage = Arc::new(FileStorage::new(&state_dir));

    match command {
        Command::FullExport => {
            let export_config = ExportConfig::from_env()?;
            let import_config = ImportConfig::from_env()?;
            let exporter = AmplitudeExporter::from_config(&export_config);
            let delivery = Arc::new(PostHogClient::new(
                &import_config.api_host,
                import_config.project_api_key.clone(),
            ));

            println!(
                "Exporting {} to {} from Amplitude",
                export_config.start_date, export_config.end_date
            );
            let report = Migration::new(storage, delivery, import_config.options(false))
                .full_export(
                    &exporter,
                    export_config.start_date,
                    export_config.end_date,
                    &state_dir.join("exports"),
                )
                .await?;

            println!("Export written to {}", report.export.dir.display());
            println!(
                "Created {} JSON files containing {} events",
                report.unzip.file_count, report.unzip.event_count
            );
            println!("Sent {} to PostHog", report.import);
        }
        Command::UnzipOnly(zip_path) => {
            let summary = migration::unzip_only(storage.as_ref(), &zip_path).await?;
            println!(
                "Created {} JSON files containing {} events in {}",
                summary.file_count,
                summary.event_count,
                summary.json_dir.display()
            );
        }
        Command::PostHogImportOnly { json_dir, resume } => {
            let import_config = ImportConfig::from_env()?;
            let delivery = Arc::new(PostHogClient::new(
                &import_config.api_host,
                import_config.project_api_key.clone(),
            ));
            info!(url = delivery.batch_url(), resume, "Starting PostHog import");

            let summary = Migration::new(storage, delivery, import_config.options(resume))
                .posthog_import_only(&json_dir)
                .await?;

            println!("Sent {} to PostHog", summary);
            if summary.missing_identity_count > 0 {
                println!(
                    "NOTE: {} events had neither user_id nor device_id",
                    summary.missing_identity_count
                );
            }
        }
        Command::Status => print_status(storage.as_ref()).await?,
    }

    Ok(())
}

async fn print_status(storage: &FileStorage) -> Result<()> {
    let state = storage.get_state().await?;
    let ledger = AliasLedger::load(storage).await?;

    println!("State file: {}", storage.state_path().display());
    println!(
        "Stage: {}",
        state
            .migration_step
            .map(|s| s.to_string())
            .unwrap_or_else(|| "not started".to_string())
    );
    if let Some(dir) = &state.migration_directory {
        println!("Export directory: {}", dir.display());
    }
    match &state.last_json_imported {
        Some(path) => println!("Last file imported: {}", path.display()),
        None => println!("Last file imported: none"),
    }
    println!("Known aliases: {}", ledger.len());
    Ok(())
}

fn init_tracing() {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    if env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}
