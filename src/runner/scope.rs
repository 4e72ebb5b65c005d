//! Fixture surface handed to a running scenario, and the per-test
//! context lease.

use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::scenario::{Fixture, FixtureSet};
use crate::db::{Database, DbCursor};
use crate::driver::traits::{Browser, BrowsingContext, Page};
use crate::utils::config::RunConfiguration;
use crate::utils::screenshot::ScreenshotTaker;

/// Owns a browsing context until it is released.
///
/// `release` closes the context. A lease dropped without being released
/// (an interrupted test) schedules the close on the current runtime, so
/// the context is closed exactly once on every path.
pub struct ContextLease {
    context: Option<Box<dyn BrowsingContext>>,
}

impl ContextLease {
    pub fn new(context: Box<dyn BrowsingContext>) -> Self {
        Self {
            context: Some(context),
        }
    }

    pub fn context(&self) -> Option<&dyn BrowsingContext> {
        self.context.as_deref()
    }

    /// Close the context, flushing its video.
    pub async fn release(mut self) -> Result<()> {
        match self.context.take() {
            Some(context) => context.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Browser context dropped without release, closing in background");
                handle.spawn(async move {
                    if let Err(e) = context.close().await {
                        log::warn!("Failed to close abandoned browser context: {:#}", e);
                    }
                });
            }
            Err(_) => log::error!("Browser context dropped outside a runtime and left open"),
        }
    }
}

/// Database access granted to one test.
pub enum DbHandle<'a> {
    Connection(&'a mut dyn Database),
    Cursor(DbCursor<'a>),
}

/// What a scenario sees while it runs.
pub struct TestScope<'a> {
    name: &'a str,
    config: &'a RunConfiguration,
    fixtures: &'a FixtureSet,
    browser: Option<&'a dyn Browser>,
    page: Option<Arc<dyn Page>>,
    screenshots: &'a ScreenshotTaker,
    db: Option<DbHandle<'a>>,
}

impl<'a> TestScope<'a> {
    pub fn new(
        name: &'a str,
        config: &'a RunConfiguration,
        fixtures: &'a FixtureSet,
        browser: Option<&'a dyn Browser>,
        page: Option<Arc<dyn Page>>,
        screenshots: &'a ScreenshotTaker,
        db: Option<DbHandle<'a>>,
    ) -> Self {
        Self {
            name,
            config,
            fixtures,
            browser,
            page,
            screenshots,
            db,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn config(&self) -> &RunConfiguration {
        self.config
    }

    fn require(&self, fixture: Fixture) -> Result<()> {
        if !self.fixtures.contains(fixture) {
            bail!(
                "Scenario '{}' did not declare the {:?} fixture",
                self.name,
                fixture
            );
        }
        Ok(())
    }

    pub fn browser(&self) -> Result<&dyn Browser> {
        self.require(Fixture::Browser)?;
        self.browser
            .ok_or_else(|| anyhow!("Browser is not available"))
    }

    pub fn page(&self) -> Result<&dyn Page> {
        self.require(Fixture::Page)?;
        self.page
            .as_deref()
            .ok_or_else(|| anyhow!("Page is not available"))
    }

    /// Capture the current page and attach it to the report.
    pub async fn take_screenshot(&self, name: Option<&str>, full_page: bool) -> Result<PathBuf> {
        self.require(Fixture::TakeScreenshot)?;
        let page = self
            .page
            .as_deref()
            .context("Page is not available")?;
        Ok(self.screenshots.capture(page, name, full_page, true).await)
    }

    pub fn db_connection(&mut self) -> Result<&mut dyn Database> {
        self.require(Fixture::DbConnection)?;
        match self.db.as_mut() {
            Some(DbHandle::Connection(conn)) => Ok(&mut **conn),
            Some(DbHandle::Cursor(cursor)) => Ok(cursor.connection()),
            None => bail!("Database connection is not available"),
        }
    }

    pub fn db_cursor(&mut self) -> Result<&mut DbCursor<'a>> {
        self.require(Fixture::DbCursor)?;
        match self.db.as_mut() {
            Some(DbHandle::Cursor(cursor)) => Ok(cursor),
            _ => bail!("Database cursor is not available"),
        }
    }

    /// Give back the database handle once the body has finished.
    pub fn into_db(self) -> Option<DbHandle<'a>> {
        self.db
    }
}
