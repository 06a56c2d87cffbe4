use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::config::PipelineConfig;
use crate::model::{DestinationReport, RunManifest, RunPaths};
use crate::pipeline::{Orchestrator, RunResult, StoragePaths};
use crate::sinks::DestinationStatus;
use crate::util::{describe_output, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: RunArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let config = resolve_config(&args)?;
    let mut orchestrator = Orchestrator::new(config)?;
    if args.skip_remote {
        orchestrator = orchestrator.without_remote();
    }
    let paths = orchestrator.paths().clone();

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        paths
            .manifest_dir()
            .join(format!("run_{}.json", utc_compact_string(started_ts)))
    });

    info!(run_id = %run_id, target_dir = %paths.target_dir.display(), "starting run");

    let result = orchestrator.run();

    let manifest = build_manifest(&args, &run_id, started_at, &paths, &result)?;
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote run manifest");

    if let Some(phase) = result.failed_phase {
        bail!(
            "run aborted while {}: {}",
            phase.as_str(),
            result.abort_reason.as_deref().unwrap_or("unknown failure")
        );
    }

    enforce_destination_policy(&result, args.require_remote)?;

    info!(
        reports = result.counts.report_rows,
        chemicals = result.counts.chemical_rows,
        blended = result.counts.blended_rows,
        "run completed"
    );

    Ok(())
}

/// With `require_remote`, every destination must have published, the remote
/// one included; otherwise failures are only logged.
fn enforce_destination_policy(result: &RunResult, require_remote: bool) -> Result<()> {
    let failed: Vec<&str> = result
        .failed_destinations()
        .map(|outcome| outcome.destination.as_str())
        .collect();
    if !failed.is_empty() {
        if require_remote {
            bail!("publishing failed for: {}", failed.join(", "));
        }
        warn!(destinations = %failed.join(", "), "some destinations were not published");
    }

    if require_remote {
        let remote_published = result.destinations.iter().any(|outcome| {
            outcome.destination.starts_with("remote")
                && outcome.status == DestinationStatus::Published
        });
        if !remote_published {
            bail!("remote destination was required but not published; is dbConnection set?");
        }
    }

    Ok(())
}

pub(crate) fn load_config(path: Option<&std::path::Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::load(path)?;
            info!(path = %path.display(), "loaded pipeline config");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn resolve_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(dir) = &args.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(dir) = &args.target_dir {
        config.target_dir = dir.clone();
    }
    if !args.report_files.is_empty() {
        config.report_files = args.report_files.clone();
    }
    if !args.chemical_files.is_empty() {
        config.chemical_files = args.chemical_files.clone();
    }

    if let Some(password) = &args.db_password {
        match config.db_connection.as_mut() {
            Some(db) => db.password = Some(password.clone()),
            None => warn!("database password supplied but no dbConnection is configured"),
        }
    }

    Ok(config)
}

fn build_manifest(
    args: &RunArgs,
    run_id: &str,
    started_at: String,
    paths: &StoragePaths,
    result: &RunResult,
) -> Result<RunManifest> {
    let mut outputs = Vec::new();
    for path in [
        &paths.reports_file,
        &paths.chemicals_file,
        &paths.blended_file,
        &paths.sqlite_db,
    ] {
        if let Some(entry) = describe_output(path)? {
            outputs.push(entry);
        }
    }

    let destinations = result
        .destinations
        .iter()
        .map(|outcome| DestinationReport {
            destination: outcome.destination.clone(),
            status: outcome.status.as_str().to_string(),
            tables_written: outcome.receipt.tables_written,
            rows_written: outcome.receipt.rows_written,
            modality: outcome.receipt.modality.clone(),
            error: outcome.error.clone(),
        })
        .collect();

    Ok(RunManifest {
        manifest_version: 1,
        run_id: run_id.to_string(),
        started_at,
        updated_at: now_utc_string(),
        status: result.state.as_str().to_string(),
        completed_phases: result
            .completed_phases
            .iter()
            .map(|phase| phase.as_str().to_string())
            .collect(),
        failed_phase: result.failed_phase.map(|phase| phase.as_str().to_string()),
        failure_reason: result.abort_reason.clone(),
        command: render_run_command(args),
        paths: RunPaths {
            source_dir: paths.source_dir.display().to_string(),
            target_dir: paths.target_dir.display().to_string(),
            sqlite_db: paths.sqlite_db.display().to_string(),
        },
        counts: result.counts.clone(),
        sources: result.sources.clone(),
        destinations,
        outputs,
    })
}

/// Command line as recorded in the manifest. The password is never included.
fn render_run_command(args: &RunArgs) -> String {
    let mut command = vec!["skytruth-etl".to_string(), "run".to_string()];

    if let Some(path) = &args.config {
        command.push("--config".to_string());
        command.push(path.display().to_string());
    }
    if let Some(dir) = &args.source_dir {
        command.push("--source-dir".to_string());
        command.push(dir.display().to_string());
    }
    if let Some(dir) = &args.target_dir {
        command.push("--target-dir".to_string());
        command.push(dir.display().to_string());
    }
    for name in &args.report_files {
        command.push("--report-file".to_string());
        command.push(name.clone());
    }
    for name in &args.chemical_files {
        command.push("--chemical-file".to_string());
        command.push(name.clone());
    }
    if args.skip_remote {
        command.push("--skip-remote".to_string());
    }
    if args.require_remote {
        command.push("--require-remote".to_string());
    }
    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }

    command.join(" ")
}
