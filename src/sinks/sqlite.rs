use std::path::{Path, PathBuf};

use rusqlite::{Connection, params_from_iter};

use crate::error::SinkError;
use crate::sinks::{Destination, NamedTable, PublishReceipt};
use crate::table::{BLANK, Table};

/// Embedded database file. Each publish opens its own connection, replaces
/// the named tables, and closes the connection again.
pub struct SqliteSink {
    path: PathBuf,
}

impl SqliteSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write_error(&self, table: &str, err: rusqlite::Error) -> SinkError {
        SinkError::Write {
            destination: self.label().to_string(),
            table: table.to_string(),
            message: err.to_string(),
        }
    }
}

impl Destination for SqliteSink {
    fn label(&self) -> &str {
        "sqlite"
    }

    fn publish(&mut self, tables: &[NamedTable<'_>]) -> Result<PublishReceipt, SinkError> {
        let mut connection = open_connection(&self.path).map_err(|err| SinkError::Connection {
            destination: self.label().to_string(),
            modality: "file".to_string(),
            message: err.to_string(),
        })?;

        let mut receipt = PublishReceipt {
            modality: Some("file".to_string()),
            ..PublishReceipt::default()
        };
        for named in tables {
            receipt.rows_written += replace_table(&mut connection, named.name, named.table)
                .map_err(|err| self.write_error(named.name, err))?;
            receipt.tables_written += 1;
        }

        connection
            .close()
            .map_err(|(_, err)| self.write_error("-", err))?;

        Ok(receipt)
    }
}

fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let connection = Connection::open(path)?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(connection)
}

/// Drops `name` if present, recreates it from the table schema and inserts
/// every row inside one transaction.
pub fn replace_table(
    connection: &mut Connection,
    name: &str,
    table: &Table,
) -> rusqlite::Result<usize> {
    let tx = connection.transaction()?;

    tx.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), [])?;

    let column_defs = table
        .columns()
        .iter()
        .map(|column| format!("{} {}", quote_ident(&column.name), column.kind.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute(
        &format!("CREATE TABLE {} ({column_defs})", quote_ident(name)),
        [],
    )?;

    let column_list = table
        .column_names()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=table.width())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");

    {
        let mut statement = tx.prepare(&format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_ident(name)
        ))?;
        for row in table.rows() {
            statement.execute(params_from_iter(
                row.iter().map(|cell| cell.as_deref().unwrap_or(BLANK)),
            ))?;
        }
    }

    tx.commit()?;
    Ok(table.len())
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn count_rows(connection: &Connection, table: &str) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
}
