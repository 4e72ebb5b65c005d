pub mod allure;
pub mod json;
pub mod junit;
pub mod types;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::runner::state::TestOutcome;

pub use allure::AllureSink;

/// Kind of file attached to a report
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttachmentType {
    Png,
    Webm,
}

impl AttachmentType {
    pub fn mime(&self) -> &'static str {
        match self {
            AttachmentType::Png => "image/png",
            AttachmentType::Webm => "video/webm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AttachmentType::Png => "png",
            AttachmentType::Webm => "webm",
        }
    }
}

/// Structured report that accepts per-test file attachments.
///
/// A sink is optional for a run: it exists only if its startup probe
/// succeeded, and callers treat every error from it as non-fatal.
pub trait ReportSink: Send + Sync {
    fn start_test(&self, name: &str) -> Result<()>;

    fn attach_file(&self, path: &Path, name: &str, kind: AttachmentType) -> Result<()>;

    fn finish_test(&self, name: &str, outcome: &TestOutcome) -> Result<()>;
}

/// Write `test-results.json` and `junit.xml` under the report root.
pub fn write_results(results: &types::TestResults, report_path: &Path) -> Result<()> {
    json::write_report(results, report_path)?;
    junit::write_report(results, report_path)?;
    Ok(())
}
