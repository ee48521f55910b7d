//! Forget every (user id, device id) pair announced to PostHog so far.
//!
//! The next import will send `$create_alias` for every pair again. Use this
//! after pointing the tool at a different PostHog project.
//!
//! Usage:
//!   MIGRATION_STATE_DIR=. cargo run --bin clear-aliases
//!
//! Add --dry-run to see how many pairs would be forgotten without changing
//! anything.

use ampmigrate::alias_ledger::AliasLedger;
use ampmigrate::config;
use ampmigrate::storage::FileStorage;
use anyhow::{Context, Result};
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");

    let storage = FileStorage::new(config::state_dir());

    println!("Clear alias ledger");
    println!("Ledger: {}", storage.alias_path().display());
    println!("Mode: {}", if dry_run { "DRY RUN" } else { "LIVE" });
    println!();

    let mut ledger = AliasLedger::load(&storage)
        .await
        .context("Failed to load alias ledger")?;

    if ledger.is_empty() {
        println!("No aliases recorded, nothing to do");
        return Ok(());
    }

    let users = ledger.entries().len();
    let pairs = ledger.len();
    if dry_run {
        println!(
            "[DRY RUN] Would forget {} pair(s) across {} user id(s)",
            pairs, users
        );
        return Ok(());
    }

    ledger
        .clear(&storage)
        .await
        .context("Failed to clear alias ledger")?;
    println!("Forgot {} pair(s) across {} user id(s)", pairs, users);

    Ok(())
}
