use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PipelineError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub report_files: Vec<String>,
    pub report_delimiter: char,
    pub chemical_files: Vec<String>,
    pub chemical_delimiter: char,
    pub output_delimiter: char,
    pub output_names: OutputNames,
    pub db_connection: Option<DbConnectionConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("~/Documents/fracking/SkyTruth"),
            target_dir: PathBuf::from("~/Documents/fracking/tempFldr"),
            report_files: vec![
                "2012_FracFocusReport.txt".to_string(),
                "2013_FracFocusReport.txt".to_string(),
            ],
            report_delimiter: '\t',
            chemical_files: vec![
                "2012_FracFocusChemical.txt".to_string(),
                "2013_FracFocusChemical.txt".to_string(),
            ],
            chemical_delimiter: '\t',
            output_delimiter: ',',
            output_names: OutputNames::default(),
            db_connection: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputNames {
    pub reports_file: String,
    pub chemicals_file: String,
    pub blended_file: String,
    pub sqlite_db: String,
    pub reports_table: String,
    pub chemicals_table: String,
    pub blended_table: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            reports_file: "rprtFile.txt".to_string(),
            chemicals_file: "chemFile.txt".to_string(),
            blended_file: "blndFile.txt".to_string(),
            sqlite_db: "FracFocusXtract.db".to_string(),
            reports_table: "reports".to_string(),
            chemicals_table: "chemicals".to_string(),
            blended_table: "reports_chemicals".to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionModality {
    Socket,
    Tcp,
}

impl ConnectionModality {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Tcp => "tcp",
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DbConnectionConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub socket: Option<PathBuf>,
    pub modalities: Vec<ConnectionModality>,
}

impl Default for DbConnectionConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            database: "FracFocusXtract".to_string(),
            socket: None,
            modalities: vec![ConnectionModality::Socket, ConnectionModality::Tcp],
        }
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for DbConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConnectionConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("socket", &self.socket)
            .field("modalities", &self.modalities)
            .finish()
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.report_files.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one report file is required".to_string(),
            ));
        }
        if self.chemical_files.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one chemical file is required".to_string(),
            ));
        }

        for (label, delimiter) in [
            ("reportDelimiter", self.report_delimiter),
            ("chemicalDelimiter", self.chemical_delimiter),
            ("outputDelimiter", self.output_delimiter),
        ] {
            delimiter_byte(delimiter).ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "{label} must be a single-byte character, got {delimiter:?}"
                ))
            })?;
        }

        let names = &self.output_names;
        let files = [
            &names.reports_file,
            &names.chemicals_file,
            &names.blended_file,
            &names.sqlite_db,
        ];
        let mut seen = HashSet::new();
        for name in files {
            if name.trim().is_empty() || !seen.insert(name.as_str()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "output file names must be non-empty and distinct, got {name:?}"
                )));
            }
        }

        let tables = [
            &names.reports_table,
            &names.chemicals_table,
            &names.blended_table,
        ];
        let mut seen = HashSet::new();
        for name in tables {
            if name.trim().is_empty() || !seen.insert(name.as_str()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "output table names must be non-empty and distinct, got {name:?}"
                )));
            }
        }

        if let Some(db) = &self.db_connection
            && db.modalities.is_empty()
        {
            return Err(PipelineError::InvalidConfig(
                "dbConnection.modalities must list at least one modality".to_string(),
            ));
        }

        Ok(())
    }
}

pub fn delimiter_byte(delimiter: char) -> Option<u8> {
    if delimiter.is_ascii() {
        Some(delimiter as u8)
    } else {
        None
    }
}
