use mysql::prelude::Queryable;
use mysql::{Conn, Opts, OptsBuilder, TxOpts, Value};
use tracing::{info, warn};

use crate::config::{ConnectionModality, DbConnectionConfig};
use crate::error::SinkError;
use crate::sinks::{Destination, NamedTable, PublishReceipt};
use crate::table::{BLANK, Table};

const DEFAULT_MYSQL_SOCKET: &str = "/var/run/mysqld/mysqld.sock";
const INSERT_BATCH_ROWS: usize = 500;

/// An open session with a remote relational store.
pub trait RemoteConnection {
    /// Drops and recreates `name`, then loads every row of `table`.
    fn replace_table(&mut self, name: &str, table: &Table) -> Result<usize, SinkError>;
}

/// Knows how to reach one kind of remote store through one or more
/// connection modalities.
pub trait Connector {
    fn driver(&self) -> &str;

    fn try_connect(
        &self,
        modality: ConnectionModality,
    ) -> Result<Box<dyn RemoteConnection>, SinkError>;
}

/// Picks the connector registered for the configured driver name.
pub fn connector_for(config: &DbConnectionConfig) -> Result<Box<dyn Connector>, SinkError> {
    match config.driver.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" => Ok(Box::new(MysqlConnector::new(config.clone()))),
        other => Err(SinkError::UnsupportedDriver(other.to_string())),
    }
}

/// Remote destination that walks the modality list in priority order and
/// publishes through the first one that connects.
pub struct RemoteDbSink {
    label: String,
    connector: Box<dyn Connector>,
    modalities: Vec<ConnectionModality>,
}

impl RemoteDbSink {
    pub fn new(connector: Box<dyn Connector>, modalities: Vec<ConnectionModality>) -> Self {
        Self {
            label: format!("remote-{}", connector.driver()),
            connector,
            modalities,
        }
    }

    fn connect(&self) -> Result<(ConnectionModality, Box<dyn RemoteConnection>), SinkError> {
        let mut attempts = Vec::with_capacity(self.modalities.len());
        for &modality in &self.modalities {
            match self.connector.try_connect(modality) {
                Ok(connection) => {
                    info!(
                        destination = %self.label,
                        modality = modality.as_str(),
                        "connected to remote database"
                    );
                    return Ok((modality, connection));
                }
                Err(err) => {
                    warn!(
                        destination = %self.label,
                        modality = modality.as_str(),
                        error = %err,
                        "connection attempt failed"
                    );
                    attempts.push(format!("{}: {err}", modality.as_str()));
                }
            }
        }

        Err(SinkError::Exhausted {
            destination: self.label.clone(),
            attempts,
        })
    }
}

impl Destination for RemoteDbSink {
    fn label(&self) -> &str {
        &self.label
    }

    fn publish(&mut self, tables: &[NamedTable<'_>]) -> Result<PublishReceipt, SinkError> {
        let (modality, mut connection) = self.connect()?;

        let mut receipt = PublishReceipt {
            modality: Some(modality.as_str().to_string()),
            ..PublishReceipt::default()
        };
        for named in tables {
            receipt.rows_written += connection.replace_table(named.name, named.table)?;
            receipt.tables_written += 1;
        }

        Ok(receipt)
    }
}

pub struct MysqlConnector {
    config: DbConnectionConfig,
}

impl MysqlConnector {
    pub fn new(config: DbConnectionConfig) -> Self {
        Self { config }
    }

    fn options(&self, modality: ConnectionModality) -> OptsBuilder {
        let base = OptsBuilder::new()
            .user(Some(&self.config.user))
            .pass(self.config.password.as_deref())
            .db_name(Some(&self.config.database));

        match modality {
            ConnectionModality::Socket => {
                let socket = self
                    .config
                    .socket
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| DEFAULT_MYSQL_SOCKET.to_string());
                base.socket(Some(socket)).prefer_socket(true)
            }
            ConnectionModality::Tcp => base
                .ip_or_hostname(Some(&self.config.host))
                .tcp_port(self.config.port)
                .socket(None::<String>)
                .prefer_socket(false),
        }
    }
}

impl Connector for MysqlConnector {
    fn driver(&self) -> &str {
        "mysql"
    }

    fn try_connect(
        &self,
        modality: ConnectionModality,
    ) -> Result<Box<dyn RemoteConnection>, SinkError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            user = %self.config.user,
            database = %self.config.database,
            modality = modality.as_str(),
            "connecting to mysql"
        );

        let conn = Conn::new(Opts::from(self.options(modality))).map_err(|err| {
            SinkError::Connection {
                destination: "remote-mysql".to_string(),
                modality: modality.as_str().to_string(),
                message: err.to_string(),
            }
        })?;

        Ok(Box::new(MysqlConnection { conn }))
    }
}

struct MysqlConnection {
    conn: Conn,
}

impl MysqlConnection {
    fn load(&mut self, name: &str, table: &Table) -> mysql::Result<usize> {
        let quoted = quote_mysql_ident(name);
        // Every column is TEXT: the blank sentinel is not a numeric literal
        // under strict SQL mode.
        let column_defs = table
            .column_names()
            .map(|column| format!("{} TEXT", quote_mysql_ident(column)))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = table
            .column_names()
            .map(quote_mysql_ident)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; table.width()].join(", ");

        self.conn.query_drop(format!("DROP TABLE IF EXISTS {quoted}"))?;
        self.conn.query_drop(format!("CREATE TABLE {quoted} ({column_defs})"))?;

        let insert = format!("INSERT INTO {quoted} ({column_list}) VALUES ({placeholders})");
        let mut tx = self.conn.start_transaction(TxOpts::default())?;
        for batch in table.rows().chunks(INSERT_BATCH_ROWS) {
            tx.exec_batch(
                &insert,
                batch.iter().map(|row| {
                    row.iter()
                        .map(|cell| Value::from(cell.as_deref().unwrap_or(BLANK)))
                        .collect::<Vec<Value>>()
                }),
            )?;
        }
        tx.commit()?;

        Ok(table.len())
    }
}

impl RemoteConnection for MysqlConnection {
    fn replace_table(&mut self, name: &str, table: &Table) -> Result<usize, SinkError> {
        self.load(name, table).map_err(|err| SinkError::Write {
            destination: "remote-mysql".to_string(),
            table: name.to_string(),
            message: err.to_string(),
        })
    }
}

fn quote_mysql_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
