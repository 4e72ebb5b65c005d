use anyhow::Result;

use super::{Database, DbRow};

/// Per-test transaction over the shared session connection.
///
/// Opening begins a transaction; [`DbCursor::finish`] decides its fate
/// from the test body's result. Exactly one of commit or rollback runs.
pub struct DbCursor<'c> {
    db: &'c mut dyn Database,
}

impl<'c> DbCursor<'c> {
    pub async fn open(db: &'c mut dyn Database) -> Result<DbCursor<'c>> {
        db.begin().await?;
        log::debug!("Opened {} cursor", db.kind());
        Ok(Self { db })
    }

    pub async fn execute(&mut self, sql: &str, params: &[String]) -> Result<u64> {
        self.db.execute(sql, params).await
    }

    pub async fn fetch_all(&mut self, sql: &str, params: &[String]) -> Result<Vec<DbRow>> {
        self.db.fetch_all(sql, params).await
    }

    pub async fn fetch_one(&mut self, sql: &str, params: &[String]) -> Result<Option<DbRow>> {
        self.db.fetch_one(sql, params).await
    }

    /// The connection the cursor runs on.
    pub fn connection(&mut self) -> &mut dyn Database {
        &mut *self.db
    }

    /// Commit when `outcome` is `Ok`, otherwise roll back and hand the
    /// original error back untouched.
    ///
    /// A failed commit surfaces as an error of its own. A failed rollback
    /// is only logged.
    pub async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.db.commit().await?;
                log::debug!("Cursor committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.db.rollback().await {
                    log::error!("Rollback failed: {:#}", rollback_err);
                } else {
                    log::debug!("Cursor rolled back");
                }
                Err(e)
            }
        }
    }
}
