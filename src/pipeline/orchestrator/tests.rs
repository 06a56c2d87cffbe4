use std::fs;
use std::path::Path;

use rusqlite::Connection;
use tempfile::TempDir;

use super::*;
use crate::config::ConnectionModality;
use crate::error::SinkError;
use crate::model::{CHEMICAL_COLUMNS, REPORT_COLUMNS};
use crate::sinks::RemoteConnection;
use crate::sinks::sqlite::count_rows;

fn report_line(pdf_seqid: u32, well_name: &str) -> String {
    let mut fields: Vec<String> = REPORT_COLUMNS
        .iter()
        .map(|(name, _)| match *name {
            "pdf_seqid" => pdf_seqid.to_string(),
            "r_seqid" => (pdf_seqid * 10).to_string(),
            "well_name" => well_name.to_string(),
            "latitude" => "40.25".to_string(),
            "longitude" => "-80.5".to_string(),
            "total_water_volume" => String::new(),
            other => format!("{other}-{pdf_seqid}"),
        })
        .collect();
    fields.push("dropped".to_string());
    fields.join("\t")
}

fn chemical_line(pdf_seqid: u32, row: u32, trade_name: &str) -> String {
    let mut fields: Vec<String> = CHEMICAL_COLUMNS
        .iter()
        .map(|(name, _)| match *name {
            "pdf_seqid" => pdf_seqid.to_string(),
            "c_seqid" => (pdf_seqid * 100 + row).to_string(),
            "row" => row.to_string(),
            "trade_name" => trade_name.to_string(),
            "comments" => String::new(),
            other => format!("{other}-{row}"),
        })
        .collect();
    fields.push("dropped".to_string());
    fields.join("\t")
}

fn header(columns: &[(&str, crate::table::ColumnKind)]) -> String {
    let mut names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    names.push("source_only");
    names.join("\t")
}

fn write_source(dir: &Path, name: &str, header: &str, lines: &[String]) {
    let mut body = format!("{header}\n");
    for line in lines {
        body.push_str(line);
        body.push('\n');
    }
    fs::write(dir.join(name), body).unwrap();
}

struct Fixture {
    _root: TempDir,
    config: PipelineConfig,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let source = root.path().join("source");
    fs::create_dir_all(&source).unwrap();

    let report_header = header(REPORT_COLUMNS);
    let chemical_header = header(CHEMICAL_COLUMNS);
    write_source(&source, "2012_report.txt", &report_header, &[
        report_line(1, "A"),
        report_line(2, "B"),
        "garbage\tline".to_string(),
    ]);
    write_source(&source, "2013_report.txt", &report_header, &[report_line(4, "D")]);
    write_source(&source, "2012_chemical.txt", &chemical_header, &[
        chemical_line(1, 1, "X"),
        chemical_line(1, 2, "Y"),
    ]);
    write_source(&source, "2013_chemical.txt", &chemical_header, &[
        chemical_line(3, 1, "Z"),
        chemical_line(4, 1, "W"),
    ]);

    let config = PipelineConfig {
        source_dir: source,
        target_dir: root.path().join("target"),
        report_files: vec!["2012_report.txt".to_string(), "2013_report.txt".to_string()],
        chemical_files: vec![
            "2012_chemical.txt".to_string(),
            "2013_chemical.txt".to_string(),
        ],
        ..PipelineConfig::default()
    };

    Fixture {
        _root: root,
        config,
    }
}

fn run_local(config: &PipelineConfig) -> (RunResult, StoragePaths) {
    let orchestrator = Orchestrator::new(config.clone()).unwrap().without_remote();
    let paths = orchestrator.paths().clone();
    (orchestrator.run(), paths)
}

fn status_of(result: &RunResult, destination: &str) -> DestinationStatus {
    result
        .destinations
        .iter()
        .find(|outcome| outcome.destination == destination)
        .map(|outcome| outcome.status)
        .unwrap_or_else(|| panic!("no outcome for {destination}"))
}

#[test]
fn full_run_publishes_three_tables_to_files_and_sqlite() {
    let fixture = fixture();
    let (result, paths) = run_local(&fixture.config);

    assert!(result.is_done(), "run should finish: {:?}", result.abort_reason);
    assert_eq!(
        result.completed_phases,
        vec![
            RunPhase::Validating,
            RunPhase::Purging,
            RunPhase::Ingesting,
            RunPhase::Blending,
            RunPhase::Publishing,
        ]
    );
    assert_eq!(result.counts.report_rows, 3);
    assert_eq!(result.counts.chemical_rows, 4);
    assert_eq!(result.counts.blended_rows, 3);
    assert_eq!(result.counts.skipped_report_rows, 1);
    assert_eq!(result.sources.len(), 4);

    assert_eq!(status_of(&result, "delimited-files"), DestinationStatus::Published);
    assert_eq!(status_of(&result, "sqlite"), DestinationStatus::Published);
    assert_eq!(status_of(&result, "remote"), DestinationStatus::Skipped);

    let blended = fs::read_to_string(&paths.blended_file).unwrap();
    let lines: Vec<&str> = blended.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(!lines[0].contains("source_only"));
    assert_eq!(lines[0].split(',').count(), REPORT_COLUMNS.len() + CHEMICAL_COLUMNS.len() - 1);
    let trade_names: Vec<&str> = lines[1..]
        .iter()
        .map(|line| line.split(',').nth(REPORT_COLUMNS.len() + 2).unwrap())
        .collect();
    assert_eq!(trade_names, vec!["X", "Y", "W"]);

    let reports = fs::read_to_string(&paths.reports_file).unwrap();
    assert_eq!(reports.lines().count(), 4);
    assert!(reports.lines().nth(1).unwrap().starts_with("1,10,"));

    let connection = Connection::open(&paths.sqlite_db).unwrap();
    assert_eq!(count_rows(&connection, "reports").unwrap(), 3);
    assert_eq!(count_rows(&connection, "chemicals").unwrap(), 4);
    assert_eq!(count_rows(&connection, "reports_chemicals").unwrap(), 3);
    let water: String = connection
        .query_row(
            "SELECT total_water_volume FROM reports WHERE pdf_seqid = 4",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(water, crate::table::BLANK);
}

#[test]
fn rerunning_with_identical_inputs_regenerates_identical_outputs() {
    let fixture = fixture();
    let (first, paths) = run_local(&fixture.config);
    assert!(first.is_done());
    let snapshot: Vec<Vec<u8>> = [&paths.reports_file, &paths.chemicals_file, &paths.blended_file]
        .iter()
        .map(|path| fs::read(path).unwrap())
        .collect();

    let (second, _) = run_local(&fixture.config);
    assert!(second.is_done());
    assert_eq!(second.purged.len(), 4);
    let regenerated: Vec<Vec<u8>> = [
        &paths.reports_file,
        &paths.chemicals_file,
        &paths.blended_file,
    ]
    .iter()
    .map(|path| fs::read(path).unwrap())
    .collect();
    assert_eq!(snapshot, regenerated);

    let connection = Connection::open(&paths.sqlite_db).unwrap();
    assert_eq!(count_rows(&connection, "reports_chemicals").unwrap(), 3);
}

#[test]
fn schema_mismatch_during_ingest_aborts_and_leaves_no_outputs() {
    let fixture = fixture();
    let (first, paths) = run_local(&fixture.config);
    assert!(first.is_done());

    write_source(
        &fixture.config.source_dir,
        "2013_chemical.txt",
        "pdf_seqid\ttrade_name",
        &["4\tW".to_string()],
    );

    let (second, _) = run_local(&fixture.config);
    assert_eq!(second.state, RunPhase::Aborted);
    assert_eq!(second.failed_phase, Some(RunPhase::Ingesting));
    assert!(second.abort_reason.unwrap().contains("schema mismatch"));
    for artifact in paths.output_artifacts() {
        assert!(!artifact.exists(), "{} should be gone", artifact.display());
    }
}

#[test]
fn missing_input_aborts_during_validation() {
    let mut fixture = fixture();
    let (first, paths) = run_local(&fixture.config);
    assert!(first.is_done());

    fixture
        .config
        .chemical_files
        .push("2014_chemical.txt".to_string());
    let (second, _) = run_local(&fixture.config);

    assert_eq!(second.state, RunPhase::Aborted);
    assert_eq!(second.failed_phase, Some(RunPhase::Validating));
    assert!(second.completed_phases.is_empty());
    assert!(second.abort_reason.unwrap().contains("2014_chemical.txt"));
    assert!(!paths.blended_file.exists());
    assert!(!paths.sqlite_db.exists());
}

struct Unreachable;

impl Connector for Unreachable {
    fn driver(&self) -> &str {
        "mysql"
    }

    fn try_connect(
        &self,
        modality: ConnectionModality,
    ) -> Result<Box<dyn RemoteConnection>, SinkError> {
        Err(SinkError::Connection {
            destination: "remote-mysql".to_string(),
            modality: modality.as_str().to_string(),
            message: "connection refused".to_string(),
        })
    }
}

#[test]
fn unreachable_remote_is_a_per_destination_failure() {
    let fixture = fixture();
    let orchestrator = Orchestrator::new(fixture.config.clone())
        .unwrap()
        .with_remote_connector(Box::new(Unreachable));
    let paths = orchestrator.paths().clone();
    let result = orchestrator.run();

    assert!(result.is_done());
    assert_eq!(status_of(&result, "remote-mysql"), DestinationStatus::Failed);
    assert_eq!(result.failed_destinations().count(), 1);
    assert!(paths.blended_file.exists());
    assert!(paths.sqlite_db.exists());
}

#[test]
fn repeated_unprojected_header_does_not_abort_the_run() {
    let fixture = fixture();
    let source = &fixture.config.source_dir;
    let report_header = format!("{}\tsource_only", header(REPORT_COLUMNS));
    write_source(source, "2012_report.txt", &report_header, &[
        format!("{}\textra", report_line(1, "A")),
        format!("{}\textra", report_line(2, "B")),
    ]);
    write_source(source, "2013_report.txt", &report_header, &[format!(
        "{}\textra",
        report_line(4, "D")
    )]);

    let (result, paths) = run_local(&fixture.config);
    assert!(result.is_done(), "aborted: {:?}", result.abort_reason);
    assert_eq!(result.counts.report_rows, 3);
    assert_eq!(result.counts.blended_rows, 3);

    let reports = fs::read_to_string(&paths.reports_file).unwrap();
    assert!(!reports.contains("source_only"));
}

#[test]
fn input_that_doubles_as_an_output_is_rejected_and_left_intact() {
    let mut fixture = fixture();
    let source = fixture.config.source_dir.clone();
    fs::copy(source.join("2012_report.txt"), source.join("rprtFile.txt")).unwrap();
    fixture.config.target_dir = source.clone();
    fixture.config.report_files = vec!["rprtFile.txt".to_string()];

    match Orchestrator::new(fixture.config.clone()) {
        Err(PipelineError::InvalidConfig(message)) => {
            assert!(message.contains("rprtFile.txt"))
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("overlapping input and output should be rejected"),
    }
    assert!(source.join("rprtFile.txt").is_file());
}
