use crate::runner::state::{TestRecordReport, TestSummary};
use serde::{Deserialize, Serialize};

/// Test results for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    pub session_id: String,
    pub env: String,
    pub base_url: String,
    pub tests: Vec<TestRecordReport>,
    pub summary: TestSummary,
    pub generated_at: String,
}
