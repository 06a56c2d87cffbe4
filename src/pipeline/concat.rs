use crate::error::PipelineError;
use crate::table::Table;

/// Unions same-schema tables in the order given.
///
/// Column sets must match; column order may differ, and the first table's
/// order wins. Absent cells are normalized once the union is built.
pub fn concatenate(tables: Vec<Table>) -> Result<Table, PipelineError> {
    let mut tables = tables.into_iter();
    let Some(first) = tables.next() else {
        return Err(PipelineError::schema(
            "concatenate",
            "at least one table is required",
        ));
    };

    let mut combined = first;
    for (position, table) in tables.enumerate() {
        if !combined.has_same_column_set(&table) {
            let expected: Vec<&str> = combined.column_names().collect();
            let found: Vec<&str> = table.column_names().collect();
            return Err(PipelineError::schema(
                "concatenate",
                format!(
                    "table #{} has columns [{}] but expected [{}]",
                    position + 2,
                    found.join(", "),
                    expected.join(", ")
                ),
            ));
        }

        let order: Vec<usize> = combined
            .column_names()
            .filter_map(|name| table.column_index(name))
            .collect();
        for row in table.rows() {
            let aligned = order.iter().map(|&index| row[index].clone()).collect();
            combined.push_row(aligned)?;
        }
    }

    combined.normalize_blanks();
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::BLANK;

    fn table(columns: &[&str], rows: &[&[Option<&str>]]) -> Table {
        let mut table = Table::with_text_columns(columns.iter().copied()).unwrap();
        for row in rows {
            table
                .push_row(row.iter().map(|cell| cell.map(str::to_string)).collect())
                .unwrap();
        }
        table
    }

    #[test]
    fn rows_follow_file_order_then_row_order() {
        let first = table(&["id", "name"], &[&[Some("1"), Some("a")], &[Some("2"), Some("b")]]);
        let second = table(&["id", "name"], &[&[Some("3"), Some("c")]]);

        let combined = concatenate(vec![first, second]).unwrap();
        let ids: Vec<&str> = (0..combined.len())
            .map(|row| combined.value(row, "id").unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn column_order_differences_are_realigned() {
        let first = table(&["id", "name"], &[&[Some("1"), Some("a")]]);
        let second = table(&["name", "id"], &[&[Some("b"), None]]);

        let combined = concatenate(vec![first, second]).unwrap();
        assert_eq!(combined.value(1, "name"), Some("b"));
        assert_eq!(combined.value(1, "id"), Some(BLANK));
    }

    #[test]
    fn mismatched_column_sets_are_rejected() {
        let first = table(&["id", "name"], &[]);
        let second = table(&["id", "label"], &[]);
        assert!(matches!(
            concatenate(vec![first, second]),
            Err(PipelineError::SchemaMismatch { .. })
        ));
        assert!(concatenate(Vec::new()).is_err());
    }
}
