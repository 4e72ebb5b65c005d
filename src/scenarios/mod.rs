//! Built-in smoke scenarios

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::runner::scenario::{Fixture, Scenario};
use crate::runner::scope::TestScope;

/// The base URL loads and the page ends up somewhere.
pub struct HomePageLoads;

#[async_trait]
impl Scenario for HomePageLoads {
    fn name(&self) -> &str {
        "home_page_loads"
    }

    fn fixtures(&self) -> Vec<Fixture> {
        vec![Fixture::Page, Fixture::TakeScreenshot]
    }

    async fn run(&self, scope: &mut TestScope<'_>) -> Result<()> {
        let url = scope.config().base_url.clone();
        let page = scope.page()?;
        page.goto(&url).await?;

        let current = page.url().await?;
        if current.is_empty() {
            bail!("Page URL is empty after navigating to {}", url);
        }
        log::info!("Loaded {} (title: {:?})", current, page.title().await?);
        Ok(())
    }
}

/// The configured database answers `SELECT 1`.
pub struct DbConnectionSuccessful;

#[async_trait]
impl Scenario for DbConnectionSuccessful {
    fn name(&self) -> &str {
        "db_connection_successful"
    }

    fn fixtures(&self) -> Vec<Fixture> {
        vec![Fixture::DbConnection]
    }

    async fn run(&self, scope: &mut TestScope<'_>) -> Result<()> {
        let row = scope
            .db_connection()?
            .fetch_one("SELECT 1", &[])
            .await?
            .context("SELECT 1 returned no rows")?;
        log::info!("Database connection verified ({} column)", row.len());
        Ok(())
    }
}

/// Every scenario shipped with the harness, in run order.
pub fn builtin() -> Vec<Box<dyn Scenario>> {
    vec![Box::new(HomePageLoads), Box::new(DbConnectionSuccessful)]
}
