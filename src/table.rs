use std::collections::HashSet;

use crate::error::PipelineError;

/// Placeholder stored in every cell that had no value once a table has been
/// normalized.
pub const BLANK: &str = " ";

pub type Cell = Option<String>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Whether a non-blank raw value is acceptable for this kind.
    pub fn accepts(self, raw: &str) -> bool {
        match self {
            Self::Integer => parse_integer(raw).is_some(),
            Self::Real | Self::Text => true,
        }
    }
}

/// Integers exported through a float column come back as `123.0`; both forms
/// are accepted.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }
}

/// Ordered rows over a fixed, named column schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, PipelineError> {
        if columns.is_empty() {
            return Err(PipelineError::schema("table", "a table needs at least one column"));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.name.trim().is_empty() {
                return Err(PipelineError::schema("table", "column names must not be empty"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(PipelineError::schema(
                    "table",
                    format!("duplicate column name {}", column.name),
                ));
            }
        }

        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn with_text_columns<I, S>(names: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Column::text).collect())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), PipelineError> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::schema(
                "table",
                format!(
                    "row has {} values but the table has {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }

    /// Replaces every absent cell with [`BLANK`], returning how many were filled.
    pub fn normalize_blanks(&mut self) -> usize {
        let mut filled = 0;
        for cell in self.rows.iter_mut().flat_map(|row| row.iter_mut()) {
            if cell.is_none() {
                *cell = Some(BLANK.to_string());
                filled += 1;
            }
        }
        filled
    }

    pub fn has_same_column_set(&self, other: &Table) -> bool {
        self.columns.len() == other.columns.len()
            && other
                .column_names()
                .all(|name| self.column_index(name).is_some())
    }
}
