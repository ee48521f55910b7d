//! Moves an Amplitude project's raw event history into PostHog.
//!
//! The pipeline exports an archive from Amplitude, unpacks it into JSON
//! shard files, and replays every record to PostHog's batch endpoint with
//! `$create_alias` messages linking each user id to the device ids seen with
//! it. Progress and the alias ledger are persisted so a halted import can be
//! resumed.

pub mod alias_ledger;
pub mod batcher;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event_rules;
pub mod exporter;
pub mod importer;
pub mod migration;
pub mod stages;
pub mod storage;
pub mod translator;
pub mod types;
pub mod unzip;
