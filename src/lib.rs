pub mod db;
pub mod driver;
pub mod error;
pub mod report;
pub mod runner;
pub mod scenarios;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export common items
pub use runner::{run_scenarios, Session, TestOutcome, TestSummary};
pub use utils::config::RunConfiguration;
