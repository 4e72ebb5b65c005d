use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::any::{AnyConnection, AnyRow};
use sqlx::{Column, Connection, Row};

use super::{Database, DbConnector, DbKind, DbRow};
use crate::utils::config::DbSettings;

/// Opens `sqlx` connections through the `Any` driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlxConnector;

#[async_trait]
impl DbConnector for SqlxConnector {
    async fn connect(&self, settings: &DbSettings) -> Result<Box<dyn Database>> {
        sqlx::any::install_default_drivers();

        let url = connection_url(settings);
        let conn = AnyConnection::connect(&url)
            .await
            .with_context(|| format!("Failed to connect to {} database", settings.kind))?;

        Ok(Box::new(SqlxDatabase {
            conn,
            kind: settings.kind,
        }))
    }
}

/// Build the connection URL, percent-encoding credentials.
pub fn connection_url(settings: &DbSettings) -> String {
    let host = settings.host.as_deref().unwrap_or("localhost");
    let user = urlencoding::encode(settings.user.as_deref().unwrap_or_default());
    let password = urlencoding::encode(settings.password.as_deref().unwrap_or_default());
    let database = settings.database.as_deref().unwrap_or_default();

    match settings.kind {
        DbKind::Postgres => format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user,
            password,
            host,
            settings.port,
            urlencoding::encode(database),
            if settings.ssl_disabled { "disable" } else { "prefer" }
        ),
        DbKind::MySql => format!(
            "mysql://{}:{}@{}:{}/{}?ssl-mode={}",
            user,
            password,
            host,
            settings.port,
            urlencoding::encode(database),
            if settings.ssl_disabled {
                "DISABLED"
            } else {
                "PREFERRED"
            }
        ),
        DbKind::Sqlite => {
            if database.starts_with("sqlite:") {
                database.to_string()
            } else {
                format!("sqlite://{}?mode=rwc", database)
            }
        }
    }
}

pub struct SqlxDatabase {
    conn: AnyConnection,
    kind: DbKind,
}

impl SqlxDatabase {
    async fn run(&mut self, statement: &str) -> Result<()> {
        sqlx::Executor::execute(&mut self.conn, statement)
            .await
            .with_context(|| format!("Failed to execute {}", statement))?;
        Ok(())
    }
}

#[async_trait]
impl Database for SqlxDatabase {
    fn kind(&self) -> DbKind {
        self.kind
    }

    async fn execute(&mut self, sql: &str, params: &[String]) -> Result<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let result = query
            .execute(&mut self.conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to execute query: {}", e))?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[String]) -> Result<Vec<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.clone());
        }
        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to execute query: {}", e))?;

        log::debug!("Fetched {} rows", rows.len());
        Ok(rows.iter().map(to_db_row).collect())
    }

    async fn begin(&mut self) -> Result<()> {
        self.run("BEGIN").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.run("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.run("ROLLBACK").await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .context("Failed to close database connection")?;
        Ok(())
    }
}

fn to_db_row(row: &AnyRow) -> DbRow {
    let columns = row
        .columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            (column.name().to_string(), decode_value(row, index))
        })
        .collect();
    DbRow::new(columns)
}

/// Decode a column as string, integer, float or bool, else null.
fn decode_value(row: &AnyRow, index: usize) -> serde_json::Value {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(serde_json::Value::String).unwrap_or_default();
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(index) {
        return serde_json::Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(index) {
        return serde_json::Value::from(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<bool>, _>(index) {
        return serde_json::Value::from(v);
    }
    serde_json::Value::Null
}
