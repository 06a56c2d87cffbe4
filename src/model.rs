use serde::Serialize;

use crate::table::{Column, ColumnKind};

pub const JOIN_KEY: &str = "pdf_seqid";
pub const REPORT_SUFFIX: &str = "_rpt";
pub const CHEMICAL_SUFFIX: &str = "_chm";

pub const REPORT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("pdf_seqid", ColumnKind::Integer),
    ("r_seqid", ColumnKind::Integer),
    ("api", ColumnKind::Text),
    ("fracture_date", ColumnKind::Text),
    ("state", ColumnKind::Text),
    ("county", ColumnKind::Text),
    ("operator", ColumnKind::Text),
    ("well_name", ColumnKind::Text),
    ("production_type", ColumnKind::Text),
    ("latitude", ColumnKind::Real),
    ("longitude", ColumnKind::Real),
    ("datum", ColumnKind::Text),
    ("true_vertical_depth", ColumnKind::Real),
    ("total_water_volume", ColumnKind::Real),
    ("published", ColumnKind::Text),
];

pub const CHEMICAL_COLUMNS: &[(&str, ColumnKind)] = &[
    ("pdf_seqid", ColumnKind::Integer),
    ("c_seqid", ColumnKind::Integer),
    ("row", ColumnKind::Integer),
    ("trade_name", ColumnKind::Text),
    ("supplier", ColumnKind::Text),
    ("purpose", ColumnKind::Text),
    ("ingredients", ColumnKind::Text),
    ("cas_number", ColumnKind::Text),
    ("additive_concentration", ColumnKind::Real),
    ("hf_fluid_concentration", ColumnKind::Real),
    ("comments", ColumnKind::Text),
    ("cas_type", ColumnKind::Text),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Report,
    Chemical,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Chemical => "chemical",
        }
    }

    pub fn projection(self) -> Vec<Column> {
        let columns = match self {
            Self::Report => REPORT_COLUMNS,
            Self::Chemical => CHEMICAL_COLUMNS,
        };
        columns
            .iter()
            .map(|(name, kind)| Column::new(*name, *kind))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFileEntry {
    pub kind: RecordKind,
    pub path: String,
    pub rows: usize,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputFileEntry {
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationReport {
    pub destination: String,
    pub status: String,
    pub tables_written: usize,
    pub rows_written: usize,
    pub modality: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunCounts {
    pub report_rows: usize,
    pub chemical_rows: usize,
    pub blended_rows: usize,
    pub skipped_report_rows: usize,
    pub skipped_chemical_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPaths {
    pub source_dir: String,
    pub target_dir: String,
    pub sqlite_db: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub updated_at: String,
    pub status: String,
    pub completed_phases: Vec<String>,
    pub failed_phase: Option<String>,
    pub failure_reason: Option<String>,
    pub command: String,
    pub paths: RunPaths,
    pub counts: RunCounts,
    pub sources: Vec<SourceFileEntry>,
    pub destinations: Vec<DestinationReport>,
    pub outputs: Vec<OutputFileEntry>,
}
