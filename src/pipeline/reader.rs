use std::collections::HashSet;
use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use encoding_rs::Encoding;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::table::{Cell, Column, Table};

const MALFORMED_SAMPLE_LIMIT: usize = 5;

/// A source line that was dropped during ingestion.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MalformedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub table: Table,
    pub skipped_rows: usize,
    pub malformed_samples: Vec<MalformedRow>,
}

impl ReadOutcome {
    fn record_skip(&mut self, line: u64, reason: String) {
        debug!(line, reason = %reason, "skipping malformed row");
        self.skipped_rows += 1;
        if self.malformed_samples.len() < MALFORMED_SAMPLE_LIMIT {
            self.malformed_samples.push(MalformedRow { line, reason });
        }
    }
}

/// Reads a delimited text file with a header row into a [`Table`].
///
/// With a projection, only the listed columns are kept (in projection order)
/// and a header lacking any of them is a schema mismatch. Rows with the wrong
/// number of fields, or with a value the column kind rejects, are skipped and
/// counted. Absent cells are normalized to the blank sentinel before return.
/// A repeated header name keeps its first occurrence as is and later ones
/// become `name.1`, `name.2`, and so on.
pub fn read_table(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    projection: Option<&[Column]>,
) -> Result<ReadOutcome, PipelineError> {
    let raw = fs::read(path).map_err(|source| PipelineError::io(path, source))?;
    let (text, had_errors) = encoding.decode_with_bom_removal(&raw);
    if had_errors {
        warn!(
            path = %path.display(),
            encoding = encoding.name(),
            "input contained undecodable bytes; replaced with U+FFFD"
        );
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = dedupe_headers(
        reader
            .headers()
            .map_err(|source| PipelineError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(|name| name.trim().to_string()),
    );

    let (columns, source_indices) = resolve_columns(path, &headers, projection)?;
    let mut outcome = ReadOutcome {
        table: Table::new(columns)?,
        skipped_rows: 0,
        malformed_samples: Vec::new(),
    };

    let mut record = StringRecord::new();
    loop {
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {}
            Err(err) => {
                let line = err.position().map(|pos| pos.line()).unwrap_or(0);
                outcome.record_skip(line, err.to_string());
                continue;
            }
        }

        let line = record.position().map(|pos| pos.line()).unwrap_or(0);
        if record.len() != headers.len() {
            outcome.record_skip(
                line,
                format!("expected {} fields, found {}", headers.len(), record.len()),
            );
            continue;
        }

        match extract_row(&record, &source_indices, outcome.table.columns()) {
            Ok(row) => outcome.table.push_row(row)?,
            Err(reason) => outcome.record_skip(line, reason),
        }
    }

    outcome.table.normalize_blanks();

    info!(
        path = %path.display(),
        rows = outcome.table.len(),
        columns = outcome.table.width(),
        skipped = outcome.skipped_rows,
        "read delimited file"
    );

    Ok(outcome)
}

fn dedupe_headers(names: impl Iterator<Item = String>) -> Vec<String> {
    let names: Vec<String> = names.collect();
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut headers = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while taken.contains(&candidate) {
            candidate = format!("{name}.{suffix}");
            suffix += 1;
        }
        taken.insert(candidate.clone());
        headers.push(candidate);
    }
    headers
}

fn resolve_columns(
    path: &Path,
    headers: &[String],
    projection: Option<&[Column]>,
) -> Result<(Vec<Column>, Vec<usize>), PipelineError> {
    let Some(projection) = projection else {
        let columns = headers.iter().map(Column::text).collect();
        return Ok((columns, (0..headers.len()).collect()));
    };

    let mut indices = Vec::with_capacity(projection.len());
    let mut missing = Vec::new();
    for column in projection {
        match headers.iter().position(|header| *header == column.name) {
            Some(index) => indices.push(index),
            None => missing.push(column.name.as_str()),
        }
    }

    if !missing.is_empty() {
        return Err(PipelineError::schema(
            path.display().to_string(),
            format!("required columns missing from header: {}", missing.join(", ")),
        ));
    }

    Ok((projection.to_vec(), indices))
}

fn extract_row(
    record: &StringRecord,
    source_indices: &[usize],
    columns: &[Column],
) -> Result<Vec<Cell>, String> {
    let mut row = Vec::with_capacity(source_indices.len());
    for (column, &index) in columns.iter().zip(source_indices) {
        let value = record.get(index).unwrap_or_default();
        if value.is_empty() {
            row.push(None);
            continue;
        }
        if !value.trim().is_empty() && !column.kind.accepts(value) {
            return Err(format!(
                "column {} value {value:?} is not a valid {}",
                column.name,
                column.kind.sql_type().to_lowercase()
            ));
        }
        row.push(Some(value.to_string()));
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use encoding_rs::{UTF_8, WINDOWS_1252};
    use tempfile::NamedTempFile;

    use super::*;
    use crate::table::{BLANK, ColumnKind};

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write temp file");
        file.flush().expect("flush temp file");
        file
    }

    #[test]
    fn projection_keeps_exactly_the_declared_columns() {
        let file = write_temp(b"extra,pdf_seqid,well_name,other\nq,1,A,z\nr,2,B,y\n");
        let projection = vec![
            Column::new("well_name", ColumnKind::Text),
            Column::new("pdf_seqid", ColumnKind::Integer),
        ];

        let outcome = read_table(file.path(), b',', UTF_8, Some(&projection)).unwrap();
        let names: Vec<&str> = outcome.table.column_names().collect();
        assert_eq!(names, vec!["well_name", "pdf_seqid"]);
        assert!(outcome.table.rows().iter().all(|row| row.len() == 2));
        assert_eq!(outcome.table.value(1, "well_name"), Some("B"));
    }

    #[test]
    fn missing_projected_column_is_a_schema_mismatch() {
        let file = write_temp(b"pdf_seqid\twell_name\n1\tA\n");
        let projection = vec![Column::text("pdf_seqid"), Column::text("api")];

        let err = read_table(file.path(), b'\t', UTF_8, Some(&projection))
            .expect_err("api is absent from the header");
        match err {
            PipelineError::SchemaMismatch { detail, .. } => assert!(detail.contains("api")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let file = write_temp(b"pdf_seqid\twell_name\n1\tA\n2\tB\textra\n3\nx\tC\n4\tD\n");
        let projection = vec![
            Column::new("pdf_seqid", ColumnKind::Integer),
            Column::text("well_name"),
        ];

        let outcome = read_table(file.path(), b'\t', UTF_8, Some(&projection)).unwrap();
        assert_eq!(outcome.table.len(), 2);
        assert_eq!(outcome.skipped_rows, 3);
        assert_eq!(outcome.malformed_samples.len(), 3);
        assert_eq!(outcome.malformed_samples[0].line, 3);
        assert_eq!(outcome.table.value(1, "pdf_seqid"), Some("4"));
    }

    #[test]
    fn empty_fields_become_the_blank_sentinel() {
        let file = write_temp(b"a,b\n1,\n,2\n");
        let outcome = read_table(file.path(), b',', UTF_8, None).unwrap();
        assert_eq!(outcome.table.value(0, "b"), Some(BLANK));
        assert_eq!(outcome.table.value(1, "a"), Some(BLANK));
    }

    #[test]
    fn legacy_single_byte_encoding_is_decoded() {
        let file = write_temp(b"operator\nSoci\xe9t\xe9\n");
        let outcome = read_table(file.path(), b',', WINDOWS_1252, None).unwrap();
        assert_eq!(outcome.table.value(0, "operator"), Some("Société"));
    }

    #[test]
    fn repeated_header_names_get_numbered_suffixes() {
        let file = write_temp(b"pdf_seqid\tnote\tnote\tnote.1\n1\ta\tb\tc\n");
        let outcome = read_table(file.path(), b'\t', UTF_8, None).unwrap();
        let names: Vec<&str> = outcome.table.column_names().collect();
        assert_eq!(names, vec!["pdf_seqid", "note", "note.1", "note.1.1"]);
        assert_eq!(outcome.table.value(0, "note"), Some("a"));
        assert_eq!(outcome.table.value(0, "note.1"), Some("b"));
        assert_eq!(outcome.table.value(0, "note.1.1"), Some("c"));

        let projection = vec![Column::new("pdf_seqid", ColumnKind::Integer)];
        let projected = read_table(file.path(), b'\t', UTF_8, Some(&projection)).unwrap();
        assert_eq!(projected.table.len(), 1);
    }

    #[test]
    fn declared_encoding_is_not_overridden_by_a_byte_order_mark() {
        let file = write_temp(b"\xff\xfename\nx\n");
        let outcome = read_table(file.path(), b',', WINDOWS_1252, None).unwrap();
        let names: Vec<&str> = outcome.table.column_names().collect();
        assert_eq!(names, vec!["\u{ff}\u{fe}name"]);
        assert_eq!(outcome.table.value(0, "\u{ff}\u{fe}name"), Some("x"));
    }
}
