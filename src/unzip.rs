//! Turns an Amplitude export archive into one JSON array file per shard.
//!
//! The archive is a zip of gzipped, line-delimited JSON files. Each `.gz`
//! member becomes `<archive dir>/json/<member name without .gz>`.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

const JSON_DIR_NAME: &str = "json";
const DECOMPRESS_CONCURRENCY: usize = 4;
/// Upper bound on buffer preallocation taken from a member's declared size.
const MAX_PREALLOC_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct UnzipSummary {
    pub json_dir: PathBuf,
    pub event_count: usize,
    pub file_count: usize,
}

struct GzMember {
    name: String,
    data: Vec<u8>,
}

pub async fn unzip_export(zip_path: &Path) -> Result<UnzipSummary> {
    let json_dir = zip_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(JSON_DIR_NAME);
    tokio::fs::create_dir_all(&json_dir)
        .await
        .with_context(|| format!("Failed to create {}", json_dir.display()))?;

    let archive_path = zip_path.to_path_buf();
    let members = tokio::task::spawn_blocking(move || read_gz_members(&archive_path))
        .await
        .context("Archive reader panicked")??;
    info!(members = members.len(), "Read export archive");

    let results: Vec<_> = stream::iter(members)
        .map(|member| {
            let json_dir = json_dir.clone();
            tokio::task::spawn_blocking(move || write_shard(&json_dir, &member))
        })
        .buffer_unordered(DECOMPRESS_CONCURRENCY)
        .collect()
        .await;

    let mut summary = UnzipSummary {
        json_dir,
        event_count: 0,
        file_count: 0,
    };
    for result in results {
        summary.event_count += result.context("Decompression task panicked")??;
        summary.file_count += 1;
    }

    info!(
        files = summary.file_count,
        events = summary.event_count,
        dir = %summary.json_dir.display(),
        "Unzipped export"
    );
    Ok(summary)
}

fn read_gz_members(zip_path: &Path) -> Result<Vec<GzMember>> {
    let file =
        File::open(zip_path).with_context(|| format!("Failed to open {}", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{} is not a zip archive", zip_path.display()))?;

    let mut members = Vec::new();
    let mut seen = HashSet::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() || !entry.name().ends_with(".gz") {
            continue;
        }
        let Some(name) = Path::new(entry.name())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
        else {
            continue;
        };
        // members land in one flat directory
        if !seen.insert(name.clone()) {
            anyhow::bail!(
                "{} holds more than one member named {}",
                zip_path.display(),
                name
            );
        }
        let mut data = Vec::with_capacity(capacity_hint(entry.size()));
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("Failed to read {} from archive", name))?;
        members.push(GzMember { name, data });
    }
    Ok(members)
}

fn capacity_hint(declared_size: u64) -> usize {
    declared_size.min(MAX_PREALLOC_BYTES) as usize
}

/// Returns the number of records written.
fn write_shard(json_dir: &Path, member: &GzMember) -> Result<usize> {
    let mut text = String::new();
    MultiGzDecoder::new(member.data.as_slice())
        .read_to_string(&mut text)
        .with_context(|| format!("Failed to decompress {}", member.name))?;

    let records = parse_lines(&text).with_context(|| format!("Failed to parse {}", member.name))?;

    let file_name = member.name.strip_suffix(".gz").unwrap_or(&member.name);
    let path = json_dir.join(file_name);
    std::fs::write(&path, serde_json::to_vec_pretty(&records)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(file = %path.display(), records = records.len(), "Wrote shard");

    Ok(records.len())
}

fn parse_lines(text: &str) -> Result<Vec<Value>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid JSON on record {}", n + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn write_zip(path: &Path, members: &[(&str, Vec<u8>)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn parse_lines_skips_blank_lines_and_handles_crlf() {
        let records = parse_lines("{\"a\":1}\r\n\r\n{\"a\":2}\n\n").unwrap();
        assert_eq!(records, vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})]);
    }

    #[test]
    fn parse_lines_reports_bad_record() {
        let err = parse_lines("{\"a\":1}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("record 2"));
    }

    #[tokio::test]
    async fn unzip_writes_one_json_array_per_gz_member() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("export.zip");
        write_zip(
            &zip_path,
            &[
                (
                    "123/123_2022-01-01_0#0.json.gz",
                    gzip("{\"event_type\":\"a\"}\n{\"event_type\":\"b\"}\n"),
                ),
                ("123/123_2022-01-01_1#0.json.gz", gzip("{\"event_type\":\"c\"}\n")),
                ("README.txt", b"not a shard".to_vec()),
            ],
        );

        let summary = unzip_export(&zip_path).await.unwrap();

        assert_eq!(summary.json_dir, dir.path().join("json"));
        assert_eq!(summary.file_count, 2);
        assert_eq!(summary.event_count, 3);

        let first: Vec<Value> = serde_json::from_slice(
            &std::fs::read(summary.json_dir.join("123_2022-01-01_0#0.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1]["event_type"], "b");
        assert!(summary.json_dir.join("123_2022-01-01_1#0.json").exists());
        assert!(!summary.json_dir.join("README.txt").exists());
    }

    #[test]
    fn declared_size_only_bounds_preallocation() {
        assert_eq!(capacity_hint(1024), 1024);
        assert_eq!(capacity_hint(u64::MAX), MAX_PREALLOC_BYTES as usize);
    }

    #[tokio::test]
    async fn same_shard_name_in_two_folders_is_rejected() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("export.zip");
        write_zip(
            &zip_path,
            &[
                ("a/shard#0.json.gz", gzip("{\"event_type\":\"a\"}\n")),
                ("b/shard#0.json.gz", gzip("{\"event_type\":\"b\"}\n")),
            ],
        );

        let err = unzip_export(&zip_path).await.unwrap_err();
        assert!(err.to_string().contains("more than one member named shard#0.json.gz"));
        assert!(!dir.path().join("json").join("shard#0.json").exists());
    }

    #[tokio::test]
    async fn corrupt_member_fails_the_stage() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("export.zip");
        write_zip(&zip_path, &[("bad.json.gz", b"definitely not gzip".to_vec())]);

        let err = unzip_export(&zip_path).await.unwrap_err();
        assert!(format!("{:#}", err).contains("bad.json.gz"));
    }

    #[tokio::test]
    async fn missing_archive_is_an_error() {
        let dir = tempdir().unwrap();
        let err = unzip_export(&dir.path().join("missing.zip")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
