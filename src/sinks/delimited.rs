use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use csv::{Terminator, WriterBuilder};
use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::error::{PipelineError, SinkError};
use crate::sinks::{Destination, NamedTable, PublishReceipt};
use crate::table::{BLANK, Table};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WriteMode {
    Overwrite,
    /// Adds rows to the end of the file; the header is only written into an
    /// empty file.
    Append,
}

/// Serializes `table` with a header row and writes it in `encoding`.
/// Returns the number of bytes written.
pub fn write_table(
    path: &Path,
    table: &Table,
    delimiter: u8,
    encoding: &'static Encoding,
    mode: WriteMode,
) -> Result<u64, PipelineError> {
    let mut file = match mode {
        WriteMode::Overwrite => File::create(path),
        WriteMode::Append => OpenOptions::new().create(true).append(true).open(path),
    }
    .map_err(|source| PipelineError::io(path, source))?;

    let existing = file
        .metadata()
        .map_err(|source| PipelineError::io(path, source))?
        .len();
    let with_header = mode == WriteMode::Overwrite || existing == 0;

    let text = render(path, table, delimiter, with_header)?;
    let (bytes, _, unmappable) = encoding.encode(&text);
    if unmappable {
        warn!(
            path = %path.display(),
            encoding = encoding.name(),
            "characters outside the target encoding were written as numeric references"
        );
    }

    file.write_all(&bytes)
        .and_then(|()| file.flush())
        .map_err(|source| PipelineError::io(path, source))?;

    debug!(
        path = %path.display(),
        rows = table.len(),
        bytes = bytes.len(),
        header = with_header,
        "wrote delimited file"
    );

    Ok(bytes.len() as u64)
}

fn render(
    path: &Path,
    table: &Table,
    delimiter: u8,
    with_header: bool,
) -> Result<String, PipelineError> {
    let csv_error = |source| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(table.column_names()).map_err(csv_error)?;
    }
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or(BLANK)))
            .map_err(csv_error)?;
    }

    let buffer = writer
        .into_inner()
        .map_err(|err| PipelineError::io(path, io::Error::other(err.to_string())))?;
    String::from_utf8(buffer)
        .map_err(|err| PipelineError::io(path, io::Error::new(io::ErrorKind::InvalidData, err)))
}

/// Overwrites one delimited file per table.
pub struct DelimitedFileSink {
    delimiter: u8,
    encoding: &'static Encoding,
}

impl DelimitedFileSink {
    pub fn new(delimiter: u8, encoding: &'static Encoding) -> Self {
        Self {
            delimiter,
            encoding,
        }
    }
}

impl Destination for DelimitedFileSink {
    fn label(&self) -> &str {
        "delimited-files"
    }

    fn publish(&mut self, tables: &[NamedTable<'_>]) -> Result<PublishReceipt, SinkError> {
        let mut receipt = PublishReceipt::default();
        for named in tables {
            write_table(
                named.file,
                named.table,
                self.delimiter,
                self.encoding,
                WriteMode::Overwrite,
            )
            .map_err(|err| SinkError::Write {
                destination: self.label().to_string(),
                table: named.name.to_string(),
                message: err.to_string(),
            })?;
            receipt.tables_written += 1;
            receipt.rows_written += named.table.len();
        }
        Ok(receipt)
    }
}
