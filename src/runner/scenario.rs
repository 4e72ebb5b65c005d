use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::scope::TestScope;

/// Resources a scenario can ask the harness for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Fixture {
    /// Session-scoped browser process
    Browser,
    /// Fresh context and page, per test
    Page,
    TakeScreenshot,
    /// Session-scoped database connection
    DbConnection,
    /// Per-test transaction on the session connection
    DbCursor,
}

impl Fixture {
    fn requires(self) -> &'static [Fixture] {
        match self {
            Fixture::Browser | Fixture::DbConnection => &[],
            Fixture::Page => &[Fixture::Browser],
            Fixture::TakeScreenshot => &[Fixture::Page, Fixture::Browser],
            Fixture::DbCursor => &[Fixture::DbConnection],
        }
    }
}

/// Declared fixtures plus everything they imply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureSet {
    fixtures: Vec<Fixture>,
}

impl FixtureSet {
    pub fn resolve(declared: &[Fixture]) -> Self {
        let mut fixtures: Vec<Fixture> = Vec::new();
        for fixture in declared {
            for needed in std::iter::once(fixture).chain(fixture.requires()) {
                if !fixtures.contains(needed) {
                    fixtures.push(*needed);
                }
            }
        }
        Self { fixtures }
    }

    pub fn contains(&self, fixture: Fixture) -> bool {
        self.fixtures.contains(&fixture)
    }

    pub fn needs_browser(&self) -> bool {
        self.contains(Fixture::Browser)
    }

    pub fn needs_db(&self) -> bool {
        self.contains(Fixture::DbConnection)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter()
    }
}

/// A test body layered on the harness fixtures.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    fn fixtures(&self) -> Vec<Fixture>;

    async fn run(&self, scope: &mut TestScope<'_>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implied_fixtures() {
        let set = FixtureSet::resolve(&[Fixture::TakeScreenshot, Fixture::DbCursor]);
        assert!(set.contains(Fixture::Page));
        assert!(set.needs_browser());
        assert!(set.needs_db());

        let set = FixtureSet::resolve(&[Fixture::DbConnection]);
        assert!(!set.needs_browser());
        assert!(!set.contains(Fixture::DbCursor));
    }

    #[test]
    fn test_resolve_deduplicates() {
        let set = FixtureSet::resolve(&[Fixture::Page, Fixture::Browser, Fixture::Page]);
        assert_eq!(set.iter().count(), 2);
    }
}
