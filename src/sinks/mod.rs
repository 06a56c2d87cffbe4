use std::path::Path;

use tracing::{info, warn};

use crate::error::SinkError;
use crate::table::Table;

pub mod delimited;
pub mod remote;
pub mod sqlite;

pub use delimited::{DelimitedFileSink, WriteMode, write_table};
pub use remote::{Connector, RemoteConnection, RemoteDbSink, connector_for};
pub use sqlite::SqliteSink;

/// One result table together with the names each destination files it under.
#[derive(Debug, Clone, Copy)]
pub struct NamedTable<'a> {
    pub name: &'a str,
    pub file: &'a Path,
    pub table: &'a Table,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PublishReceipt {
    pub tables_written: usize,
    pub rows_written: usize,
    pub modality: Option<String>,
}

/// A place result tables are written to. Implementations acquire whatever
/// handle they need inside `publish` and release it before returning.
pub trait Destination {
    fn label(&self) -> &str;

    fn publish(&mut self, tables: &[NamedTable<'_>]) -> Result<PublishReceipt, SinkError>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DestinationStatus {
    Published,
    Failed,
    Skipped,
}

impl DestinationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DestinationOutcome {
    pub destination: String,
    pub status: DestinationStatus,
    pub receipt: PublishReceipt,
    pub error: Option<String>,
}

impl DestinationOutcome {
    pub fn skipped(destination: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            status: DestinationStatus::Skipped,
            receipt: PublishReceipt::default(),
            error: Some(reason.into()),
        }
    }

    pub fn failed(destination: impl Into<String>, error: &SinkError) -> Self {
        Self {
            destination: destination.into(),
            status: DestinationStatus::Failed,
            receipt: PublishReceipt::default(),
            error: Some(error.to_string()),
        }
    }
}

/// Writes every table to every destination. A failing destination is
/// recorded and the remaining ones still run.
pub fn fan_out(
    tables: &[NamedTable<'_>],
    destinations: &mut [Box<dyn Destination>],
) -> Vec<DestinationOutcome> {
    let mut outcomes = Vec::with_capacity(destinations.len());

    for destination in destinations.iter_mut() {
        let label = destination.label().to_string();
        match destination.publish(tables) {
            Ok(receipt) => {
                info!(
                    destination = %label,
                    tables = receipt.tables_written,
                    rows = receipt.rows_written,
                    modality = %receipt.modality.as_deref().unwrap_or("-"),
                    "published tables"
                );
                outcomes.push(DestinationOutcome {
                    destination: label,
                    status: DestinationStatus::Published,
                    receipt,
                    error: None,
                });
            }
            Err(err) => {
                warn!(destination = %label, error = %err, "publish failed");
                outcomes.push(DestinationOutcome::failed(label, &err));
            }
        }
    }

    outcomes
}
