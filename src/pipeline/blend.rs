use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::error::PipelineError;
use crate::table::{BLANK, Cell, Column, Table, parse_integer};

/// Inner equi-join of `reports` and `chemicals` on `key`.
///
/// Output columns are the report columns in order followed by the chemical
/// columns without the key. Non-key names present on both sides get
/// `report_suffix` / `chemical_suffix` appended. Rows come out report-major,
/// chemical order within each match group. Blank keys match other blank
/// keys like any other value.
pub fn blend(
    reports: &Table,
    chemicals: &Table,
    key: &str,
    report_suffix: &str,
    chemical_suffix: &str,
) -> Result<Table, PipelineError> {
    let report_key = reports.column_index(key).ok_or_else(|| {
        PipelineError::schema("blend", format!("reports table lacks join key {key}"))
    })?;
    let chemical_key = chemicals.column_index(key).ok_or_else(|| {
        PipelineError::schema("blend", format!("chemicals table lacks join key {key}"))
    })?;

    let overlap: HashSet<&str> = reports
        .column_names()
        .filter(|name| *name != key && chemicals.column_index(name).is_some())
        .collect();

    let mut columns = Vec::with_capacity(reports.width() + chemicals.width() - 1);
    for column in reports.columns() {
        columns.push(renamed(column, &overlap, report_suffix));
    }
    for (index, column) in chemicals.columns().iter().enumerate() {
        if index != chemical_key {
            columns.push(renamed(column, &overlap, chemical_suffix));
        }
    }
    let mut blended = Table::new(columns)?;

    let mut chemical_groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (row_index, row) in chemicals.rows().iter().enumerate() {
        chemical_groups
            .entry(join_value(&row[chemical_key]))
            .or_default()
            .push(row_index);
    }

    for report_row in reports.rows() {
        let Some(matches) = chemical_groups.get(&join_value(&report_row[report_key])) else {
            continue;
        };

        for &chemical_index in matches {
            let chemical_row = &chemicals.rows()[chemical_index];
            let mut row: Vec<Cell> = Vec::with_capacity(blended.width());
            row.extend(report_row.iter().cloned());
            row.extend(
                chemical_row
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| *index != chemical_key)
                    .map(|(_, cell)| cell.clone()),
            );
            blended.push_row(row)?;
        }
    }

    blended.normalize_blanks();

    info!(
        reports = reports.len(),
        chemicals = chemicals.len(),
        blended = blended.len(),
        renamed_columns = overlap.len(),
        "blended reports with chemicals"
    );

    Ok(blended)
}

fn renamed(column: &Column, overlap: &HashSet<&str>, suffix: &str) -> Column {
    if overlap.contains(column.name.as_str()) {
        Column::new(format!("{}{suffix}", column.name), column.kind)
    } else {
        column.clone()
    }
}

/// Canonical form of a key cell so `7` and `7.0` land in the same group.
fn join_value(cell: &Cell) -> String {
    let raw = cell.as_deref().unwrap_or(BLANK).trim();
    match parse_integer(raw) {
        Some(value) => value.to_string(),
        None => raw.to_string(),
    }
}
