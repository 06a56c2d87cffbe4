use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{kind} file does not exist: {}", path.display())]
    MissingInput { kind: &'static str, path: PathBuf },

    #[error("schema mismatch in {context}: {detail}")]
    SchemaMismatch { context: String, detail: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("delimited data failure on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl PipelineError {
    pub fn schema(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection to {destination} via {modality} failed: {message}")]
    Connection {
        destination: String,
        modality: String,
        message: String,
    },

    #[error("every connection modality for {destination} failed: {}", attempts.join("; "))]
    Exhausted {
        destination: String,
        attempts: Vec<String>,
    },

    #[error("write of table {table} to {destination} failed: {message}")]
    Write {
        destination: String,
        table: String,
        message: String,
    },

    #[error("no connector registered for driver {0}")]
    UnsupportedDriver(String),
}
