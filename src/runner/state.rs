use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::scope::ContextLease;
use crate::driver::traits::Page;

/// Phase of a single test, in execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestPhase {
    Setup,
    Call,
    Teardown,
}

/// Result of one phase, or of the whole test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestOutcome {
    Passed,
    Failed { message: String },
    Errored { message: String },
    Skipped { reason: String },
}

impl TestOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }

    /// Failed or errored.
    pub fn is_failure(&self) -> bool {
        matches!(self, TestOutcome::Failed { .. } | TestOutcome::Errored { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestOutcome::Passed => "passed",
            TestOutcome::Failed { .. } => "failed",
            TestOutcome::Errored { .. } => "error",
            TestOutcome::Skipped { .. } => "skipped",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            TestOutcome::Passed => None,
            TestOutcome::Failed { message } | TestOutcome::Errored { message } => Some(message),
            TestOutcome::Skipped { reason } => Some(reason),
        }
    }
}

/// Where a test is in its resource lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    ContextAcquired,
    PageOpen,
    ScenarioRuns,
    Passed,
    Failed,
    Errored,
    ArtifactsCaptured,
    ContextReleased,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: TestPhase,
    pub outcome: TestOutcome,
}

impl PhaseReport {
    pub fn new(phase: TestPhase, outcome: TestOutcome) -> Self {
        Self { phase, outcome }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Screenshot,
    Video,
}

/// Artifact name of the screenshot taken when a test fails.
pub const FAILURE_SCREENSHOT: &str = "failed";

/// A file saved for a test, kept on disk after the run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub name: String,
    pub kind: ArtifactKind,
}

/// Per-test record threaded through setup, body and teardown.
///
/// Holds the context lease and page so teardown-time instrumentation can
/// reach them without acquiring anything again.
pub struct TestRecord {
    pub name: String,
    pub state: LifecycleState,
    pub history: Vec<LifecycleState>,
    pub context: Option<ContextLease>,
    pub page: Option<Arc<dyn Page>>,
    pub video_path: Option<PathBuf>,
    pub reports: Vec<PhaseReport>,
    pub artifacts: Vec<ArtifactRecord>,
    pub started_at: Option<Instant>,
    pub duration_ms: Option<u64>,
}

impl TestRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: LifecycleState::NotStarted,
            history: vec![LifecycleState::NotStarted],
            context: None,
            page: None,
            video_path: None,
            reports: Vec::new(),
            artifacts: Vec::new(),
            started_at: None,
            duration_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn transition(&mut self, state: LifecycleState) {
        log::debug!("{}: {:?} -> {:?}", self.name, self.state, state);
        self.state = state;
        self.history.push(state);
    }

    pub fn push_report(&mut self, report: PhaseReport) {
        self.reports.push(report);
    }

    pub fn report_for(&self, phase: TestPhase) -> Option<&PhaseReport> {
        self.reports.iter().find(|r| r.phase == phase)
    }

    pub fn failure_screenshot(&self) -> Option<&ArtifactRecord> {
        self.artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::Screenshot && a.name == FAILURE_SCREENSHOT)
    }

    pub fn finish(&mut self) {
        if let Some(start) = self.started_at {
            self.duration_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    /// Overall outcome: a failed setup wins, then the call, and a teardown
    /// error only downgrades a passing call.
    pub fn outcome(&self) -> TestOutcome {
        match self.report_for(TestPhase::Setup) {
            Some(setup) if !setup.outcome.is_passed() => return setup.outcome.clone(),
            None => {
                return TestOutcome::Errored {
                    message: "Test was interrupted before setup completed".to_string(),
                }
            }
            _ => {}
        }

        let call = match self.report_for(TestPhase::Call) {
            Some(call) => call.outcome.clone(),
            None => {
                return TestOutcome::Errored {
                    message: "Test body did not run".to_string(),
                }
            }
        };

        match self.report_for(TestPhase::Teardown) {
            Some(teardown) if call.is_passed() && !teardown.outcome.is_passed() => {
                teardown.outcome.clone()
            }
            _ => call,
        }
    }

    /// Serialize state for reporting
    pub fn to_report(&self) -> TestRecordReport {
        TestRecordReport {
            name: self.name.clone(),
            outcome: self.outcome(),
            state: self.state,
            phases: self.reports.clone(),
            artifacts: self.artifacts.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestRecordReport {
    pub name: String,
    pub outcome: TestOutcome,
    pub state: LifecycleState,
    pub phases: Vec<PhaseReport>,
    pub artifacts: Vec<ArtifactRecord>,
    pub duration_ms: Option<u64>,
}

/// Global test session state
#[derive(Debug, Clone)]
pub struct TestSessionState {
    pub session_id: String,
    pub tests: Vec<TestRecordReport>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl TestSessionState {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            tests: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn add_test(&mut self, test: TestRecordReport) {
        self.tests.push(test);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Instant::now());
    }

    pub fn summary(&self) -> TestSummary {
        let mut summary = TestSummary {
            session_id: self.session_id.clone(),
            total: self.tests.len() as u32,
            ..TestSummary::default()
        };

        for test in &self.tests {
            match test.outcome {
                TestOutcome::Passed => summary.passed += 1,
                TestOutcome::Failed { .. } => summary.failed += 1,
                TestOutcome::Errored { .. } => summary.errored += 1,
                TestOutcome::Skipped { .. } => summary.skipped += 1,
            }
        }

        summary.total_duration_ms = self.started_at.map(|start| {
            self.finished_at
                .unwrap_or_else(Instant::now)
                .duration_since(start)
                .as_millis() as u64
        });
        summary
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TestSummary {
    pub session_id: String,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub errored: u32,
    pub skipped: u32,
    pub total_duration_ms: Option<u64>,
}

impl TestSummary {
    /// True when nothing failed or errored.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(reports: Vec<PhaseReport>) -> TestRecord {
        let mut record = TestRecord::new("login");
        for report in reports {
            record.push_report(report);
        }
        record
    }

    #[test]
    fn test_setup_skip_wins() {
        let skipped = TestOutcome::Skipped {
            reason: "no database".to_string(),
        };
        let record = record_with(vec![PhaseReport::new(TestPhase::Setup, skipped.clone())]);
        assert_eq!(record.outcome(), skipped);
    }

    #[test]
    fn test_teardown_error_downgrades_only_a_pass() {
        let teardown_error = PhaseReport::new(
            TestPhase::Teardown,
            TestOutcome::Errored {
                message: "close failed".to_string(),
            },
        );
        let record = record_with(vec![
            PhaseReport::new(TestPhase::Setup, TestOutcome::Passed),
            PhaseReport::new(TestPhase::Call, TestOutcome::Passed),
            teardown_error.clone(),
        ]);
        assert_eq!(record.outcome(), teardown_error.outcome);

        let failed = TestOutcome::Failed {
            message: "title mismatch".to_string(),
        };
        let record = record_with(vec![
            PhaseReport::new(TestPhase::Setup, TestOutcome::Passed),
            PhaseReport::new(TestPhase::Call, failed.clone()),
            teardown_error,
        ]);
        assert_eq!(record.outcome(), failed);
    }

    #[test]
    fn test_summary_counts() {
        let mut session = TestSessionState::new("s-1");
        session.start();
        for outcome in [
            TestOutcome::Passed,
            TestOutcome::Failed {
                message: "x".to_string(),
            },
            TestOutcome::Skipped {
                reason: "y".to_string(),
            },
        ] {
            let mut record = TestRecord::new("t");
            record.push_report(PhaseReport::new(TestPhase::Setup, TestOutcome::Passed));
            record.push_report(PhaseReport::new(TestPhase::Call, outcome));
            session.add_test(record.to_report());
        }
        session.finish();

        let summary = session.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_string(&TestOutcome::Skipped {
            reason: "db down".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"skipped","reason":"db down"}"#);
    }
}
