use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::config::{DbConnectionConfig, PipelineConfig, delimiter_byte};
use crate::error::PipelineError;
use crate::model::{
    CHEMICAL_SUFFIX, JOIN_KEY, REPORT_SUFFIX, RecordKind, RunCounts, SourceFileEntry,
};
use crate::pipeline::blend::blend;
use crate::pipeline::concat::concatenate;
use crate::pipeline::reader::read_table;
use crate::pipeline::storage::StoragePaths;
use crate::pipeline::{ARCHIVE_ENCODING, SOURCE_ENCODING};
use crate::sinks::{
    Connector, DelimitedFileSink, Destination, DestinationOutcome, DestinationStatus, NamedTable,
    RemoteDbSink, SqliteSink, WriteMode, connector_for, fan_out, write_table,
};
use crate::table::Table;

#[cfg(test)]
mod tests;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunPhase {
    Validating,
    Purging,
    Ingesting,
    Blending,
    Publishing,
    Done,
    Aborted,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Purging => "purging",
            Self::Ingesting => "ingesting",
            Self::Blending => "blending",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug)]
pub struct RunResult {
    pub state: RunPhase,
    pub completed_phases: Vec<RunPhase>,
    pub failed_phase: Option<RunPhase>,
    pub abort_reason: Option<String>,
    pub counts: RunCounts,
    pub sources: Vec<SourceFileEntry>,
    pub purged: Vec<PathBuf>,
    pub destinations: Vec<DestinationOutcome>,
}

impl RunResult {
    fn new() -> Self {
        Self {
            state: RunPhase::Validating,
            completed_phases: Vec::new(),
            failed_phase: None,
            abort_reason: None,
            counts: RunCounts::default(),
            sources: Vec::new(),
            purged: Vec::new(),
            destinations: Vec::new(),
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        self.completed_phases.push(self.state);
        self.state = phase;
        info!(phase = phase.as_str(), "entering phase");
    }

    pub fn is_done(&self) -> bool {
        self.state == RunPhase::Done
    }

    pub fn failed_destinations(&self) -> impl Iterator<Item = &DestinationOutcome> {
        self.destinations
            .iter()
            .filter(|outcome| outcome.status == DestinationStatus::Failed)
    }
}

enum RemoteSetup {
    FromConfig,
    Disabled,
    Injected(Box<dyn Connector>),
}

enum RemotePlan {
    Publish(Box<dyn Destination>),
    Report(DestinationOutcome),
}

/// Sequences one full recompute: validate inputs, purge prior outputs,
/// ingest both record families, blend, then fan the three tables out.
pub struct Orchestrator {
    config: PipelineConfig,
    paths: StoragePaths,
    remote: RemoteSetup,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let paths = StoragePaths::resolve(&config)?;
        Ok(Self {
            config,
            paths,
            remote: RemoteSetup::FromConfig,
        })
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn without_remote(mut self) -> Self {
        self.remote = RemoteSetup::Disabled;
        self
    }

    pub fn with_remote_connector(mut self, connector: Box<dyn Connector>) -> Self {
        self.remote = RemoteSetup::Injected(connector);
        self
    }

    pub fn run(mut self) -> RunResult {
        let mut result = RunResult::new();
        info!(
            source_dir = %self.paths.source_dir.display(),
            target_dir = %self.paths.target_dir.display(),
            phase = result.state.as_str(),
            "starting run"
        );

        match self.execute(&mut result) {
            Ok(()) => result.enter(RunPhase::Done),
            Err(err) => {
                error!(phase = result.state.as_str(), error = %err, "run aborted");
                result.failed_phase = Some(result.state);
                result.abort_reason = Some(err.to_string());
                result.state = RunPhase::Aborted;

                match self.paths.purge_outputs() {
                    Ok(removed) => result.purged.extend(removed),
                    Err(purge_err) => {
                        warn!(error = %purge_err, "failed to clear outputs after abort")
                    }
                }
            }
        }

        result
    }

    fn execute(&mut self, result: &mut RunResult) -> Result<(), PipelineError> {
        self.paths.verify_inputs()?;

        result.enter(RunPhase::Purging);
        self.paths.ensure_target_dir()?;
        result.purged = self.paths.purge_outputs()?;

        result.enter(RunPhase::Ingesting);
        let reports = self.ingest(RecordKind::Report, result)?;
        let chemicals = self.ingest(RecordKind::Chemical, result)?;
        result.counts.report_rows = reports.len();
        result.counts.chemical_rows = chemicals.len();

        result.enter(RunPhase::Blending);
        let blended = blend(&reports, &chemicals, JOIN_KEY, REPORT_SUFFIX, CHEMICAL_SUFFIX)?;
        result.counts.blended_rows = blended.len();

        result.enter(RunPhase::Publishing);
        result.destinations = self.publish(&reports, &chemicals, &blended)?;

        Ok(())
    }

    /// Reads every source file of `kind`, concatenates them into the
    /// intermediate file, then re-reads that file with the fixed projection.
    fn ingest(&self, kind: RecordKind, result: &mut RunResult) -> Result<Table, PipelineError> {
        let source_delimiter = byte(match kind {
            RecordKind::Report => self.config.report_delimiter,
            RecordKind::Chemical => self.config.chemical_delimiter,
        })?;
        let output_delimiter = byte(self.config.output_delimiter)?;

        let mut tables = Vec::with_capacity(self.paths.inputs(kind).len());
        let mut skipped = 0;
        for path in self.paths.inputs(kind) {
            let outcome = read_table(path, source_delimiter, SOURCE_ENCODING, None)?;
            skipped += outcome.skipped_rows;
            if let Some(sample) = outcome.malformed_samples.first() {
                warn!(
                    path = %path.display(),
                    skipped = outcome.skipped_rows,
                    first_line = sample.line,
                    first_reason = %sample.reason,
                    "source file had malformed rows"
                );
            }
            result.sources.push(SourceFileEntry {
                kind,
                path: path.display().to_string(),
                rows: outcome.table.len(),
                skipped_rows: outcome.skipped_rows,
            });
            tables.push(outcome.table);
        }

        let combined = concatenate(tables)?;
        let intermediate = self.paths.intermediate(kind);
        write_table(
            intermediate,
            &combined,
            output_delimiter,
            ARCHIVE_ENCODING,
            WriteMode::Append,
        )?;
        info!(
            kind = kind.as_str(),
            path = %intermediate.display(),
            rows = combined.len(),
            "wrote concatenated intermediate"
        );
        drop(combined);

        let projection = kind.projection();
        let typed = read_table(
            intermediate,
            output_delimiter,
            ARCHIVE_ENCODING,
            Some(&projection),
        )?;
        skipped += typed.skipped_rows;

        match kind {
            RecordKind::Report => result.counts.skipped_report_rows = skipped,
            RecordKind::Chemical => result.counts.skipped_chemical_rows = skipped,
        }
        if skipped > 0 {
            warn!(kind = kind.as_str(), skipped, "malformed rows were skipped");
        }

        Ok(typed.table)
    }

    fn publish(
        &mut self,
        reports: &Table,
        chemicals: &Table,
        blended: &Table,
    ) -> Result<Vec<DestinationOutcome>, PipelineError> {
        let names = &self.config.output_names;
        let tables = [
            NamedTable {
                name: &names.reports_table,
                file: &self.paths.reports_file,
                table: reports,
            },
            NamedTable {
                name: &names.chemicals_table,
                file: &self.paths.chemicals_file,
                table: chemicals,
            },
            NamedTable {
                name: &names.blended_table,
                file: &self.paths.blended_file,
                table: blended,
            },
        ];

        let mut destinations: Vec<Box<dyn Destination>> = vec![
            Box::new(DelimitedFileSink::new(
                byte(self.config.output_delimiter)?,
                ARCHIVE_ENCODING,
            )),
            Box::new(SqliteSink::new(&self.paths.sqlite_db)),
        ];

        let remote_setup = std::mem::replace(&mut self.remote, RemoteSetup::Disabled);
        let mut reported = Vec::new();
        match plan_remote(remote_setup, self.config.db_connection.as_ref()) {
            RemotePlan::Publish(destination) => destinations.push(destination),
            RemotePlan::Report(outcome) => reported.push(outcome),
        }

        let mut outcomes = fan_out(&tables, &mut destinations);
        outcomes.extend(reported);
        Ok(outcomes)
    }
}

fn plan_remote(setup: RemoteSetup, db: Option<&DbConnectionConfig>) -> RemotePlan {
    let modalities = db
        .map(|db| db.modalities.clone())
        .unwrap_or_else(|| DbConnectionConfig::default().modalities);

    match setup {
        RemoteSetup::Disabled => {
            RemotePlan::Report(DestinationOutcome::skipped("remote", "disabled for this run"))
        }
        RemoteSetup::Injected(connector) => {
            RemotePlan::Publish(Box::new(RemoteDbSink::new(connector, modalities)))
        }
        RemoteSetup::FromConfig => match db {
            None => RemotePlan::Report(DestinationOutcome::skipped(
                "remote",
                "no dbConnection configured",
            )),
            Some(db) => match connector_for(db) {
                Ok(connector) => {
                    RemotePlan::Publish(Box::new(RemoteDbSink::new(connector, modalities)))
                }
                Err(err) => {
                    warn!(driver = %db.driver, error = %err, "remote destination unavailable");
                    RemotePlan::Report(DestinationOutcome::failed(
                        format!("remote-{}", db.driver),
                        &err,
                    ))
                }
            },
        },
    }
}

fn byte(delimiter: char) -> Result<u8, PipelineError> {
    delimiter_byte(delimiter).ok_or_else(|| {
        PipelineError::InvalidConfig(format!("delimiter {delimiter:?} is not a single byte"))
    })
}
