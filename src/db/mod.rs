//! Database fixtures: a session-scoped connection and per-test cursors.

pub mod any;
pub mod cursor;

use anyhow::Result;
use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::utils::config::DbSettings;

pub use any::SqlxConnector;
pub use cursor::DbCursor;

/// Supported database drivers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DbKind {
    #[default]
    Postgres,
    MySql,
    Sqlite,
}

impl FromStr for DbKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DbKind::Postgres),
            "mysql" => Ok(DbKind::MySql),
            "sqlite" => Ok(DbKind::Sqlite),
            other => Err(format!("Unsupported database type: {}", other)),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbKind::Postgres => "POSTGRES",
            DbKind::MySql => "MYSQL",
            DbKind::Sqlite => "SQLITE",
        };
        f.write_str(name)
    }
}

/// A result row addressable by column name, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbRow {
    columns: Vec<(String, serde_json::Value)>,
}

impl DbRow {
    pub fn new(columns: Vec<(String, serde_json::Value)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| v.as_i64())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for DbRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// An open database connection.
///
/// Transactions are driven explicitly so one connection can be reused
/// serially by every test of a session.
#[async_trait]
pub trait Database: Send {
    fn kind(&self) -> DbKind;

    /// Run a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[String]) -> Result<u64>;

    async fn fetch_all(&mut self, sql: &str, params: &[String]) -> Result<Vec<DbRow>>;

    async fn fetch_one(&mut self, sql: &str, params: &[String]) -> Result<Option<DbRow>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens connections for a given set of settings.
#[async_trait]
pub trait DbConnector: Send + Sync {
    async fn connect(&self, settings: &DbSettings) -> Result<Box<dyn Database>>;
}

/// Open the session connection, or explain why database tests must skip.
///
/// Missing settings and connection failures are environment state, so both
/// come back as a skip reason rather than an error.
pub async fn acquire_connection(
    connector: &dyn DbConnector,
    settings: &DbSettings,
    env: &str,
) -> Result<Box<dyn Database>, String> {
    let missing = settings.missing_fields();
    if !missing.is_empty() {
        return Err(format!(
            "Missing required database configuration ({}). Check environment variables for DB_HOST, DB_PORT, DB_USER, DB_PASS, DB_NAME. Current ENV={}",
            missing.join(", "),
            env
        ));
    }

    match connector.connect(settings).await {
        Ok(db) => {
            log::info!(
                "Connected to {} database: {}",
                settings.kind,
                settings.database.as_deref().unwrap_or_default()
            );
            Ok(db)
        }
        Err(e) => Err(format!("Database connection failed: {:#}", e)),
    }
}
