use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::run::load_config;
use crate::pipeline::StoragePaths;
use crate::sinks::sqlite::count_rows;
use crate::util::describe_output;

#[derive(Debug, Clone, Deserialize)]
struct RunManifestSummary {
    run_id: Option<String>,
    status: Option<String>,
    updated_at: Option<String>,
    failed_phase: Option<String>,
    failure_reason: Option<String>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = &args.target_dir {
        config.target_dir = dir.clone();
    }
    let paths = StoragePaths::resolve(&config)?;

    info!(target_dir = %paths.target_dir.display(), "status requested");

    match latest_manifest(&paths.manifest_dir())? {
        Some(path) => {
            let raw =
                fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            let manifest: RunManifestSummary = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?;

            info!(
                path = %path.display(),
                run_id = %manifest.run_id.unwrap_or_default(),
                status = %manifest.status.unwrap_or_default(),
                updated_at = %manifest.updated_at.unwrap_or_default(),
                failed_phase = %manifest.failed_phase.unwrap_or_default(),
                failure_reason = %manifest.failure_reason.unwrap_or_default(),
                "loaded latest run manifest"
            );
        }
        None => warn!(path = %paths.manifest_dir().display(), "no run manifest found"),
    }

    for path in [&paths.reports_file, &paths.chemicals_file, &paths.blended_file] {
        match describe_output(path)? {
            Some(entry) => info!(
                path = %entry.path,
                bytes = entry.bytes,
                sha256 = %entry.sha256,
                "output file present"
            ),
            None => warn!(path = %path.display(), "output file missing"),
        }
    }

    if paths.sqlite_db.exists() {
        let conn = Connection::open_with_flags(&paths.sqlite_db, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("failed to open {}", paths.sqlite_db.display()))?;
        let names = &config.output_names;
        for table in [&names.reports_table, &names.chemicals_table, &names.blended_table] {
            match count_rows(&conn, table) {
                Ok(rows) => info!(table = %table, rows, "database table"),
                Err(err) => warn!(table = %table, error = %err, "database table unreadable"),
            }
        }
    } else {
        warn!(path = %paths.sqlite_db.display(), "database file missing");
    }

    Ok(())
}

/// Run manifests carry a compact UTC timestamp, so the greatest name is the
/// newest.
fn latest_manifest(dir: &Path) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut latest: Option<PathBuf> = None;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let is_run_manifest = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with("run_") && name.ends_with(".json"))
            .unwrap_or(false);
        if is_run_manifest && latest.as_ref().is_none_or(|current| path > *current) {
            latest = Some(path);
        }
    }

    Ok(latest)
}
