use std::sync::Arc;

use super::state::{ArtifactKind, ArtifactRecord, PhaseReport, TestPhase, TestRecord};
use crate::report::{AttachmentType, ReportSink};
use crate::utils::screenshot::ScreenshotTaker;

/// Outcome-aware reporting hook.
///
/// Observes each phase report after it is final and, for the call phase
/// only, attaches a screenshot and the recorded video to the report sink.
/// It only ever reads the outcome, and every failure inside it is logged
/// and dropped.
#[derive(Clone)]
pub struct ReportingHook {
    sink: Option<Arc<dyn ReportSink>>,
    screenshots: ScreenshotTaker,
}

impl ReportingHook {
    pub fn new(sink: Option<Arc<dyn ReportSink>>, screenshots: ScreenshotTaker) -> Self {
        Self { sink, screenshots }
    }

    /// Screenshot `{test}_{passed|failed}` while the page is still open.
    ///
    /// A failure screenshot already on the record is attached instead of
    /// taking a second one.
    pub async fn on_report(&self, report: &PhaseReport, record: &TestRecord) -> Vec<ArtifactRecord> {
        if report.phase != TestPhase::Call {
            return Vec::new();
        }
        let Some(sink) = &self.sink else {
            log::debug!("No report sink, skipping attachments for {}", record.name);
            return Vec::new();
        };
        let Some(page) = record.page.as_deref() else {
            return Vec::new();
        };

        let result = if report.outcome.is_passed() {
            "passed"
        } else {
            "failed"
        };
        let name = format!("Screenshot ({})", result);

        // The failure screenshot has this test's `{name}_failed` prefix already.
        if !report.outcome.is_passed() {
            if let Some(existing) = record.failure_screenshot() {
                if let Err(e) = sink.attach_file(&existing.path, &name, AttachmentType::Png) {
                    log::warn!("Failed to attach screenshot for {}: {:#}", record.name, e);
                }
                return Vec::new();
            }
        }

        let path = self
            .screenshots
            .capture(page, Some(&format!("{}_{}", record.name, result)), true, false)
            .await;
        if !path.exists() {
            return Vec::new();
        }

        match sink.attach_file(&path, &name, AttachmentType::Png) {
            Ok(()) => vec![ArtifactRecord {
                path,
                name,
                kind: ArtifactKind::Screenshot,
            }],
            Err(e) => {
                log::warn!("Failed to attach screenshot for {}: {:#}", record.name, e);
                Vec::new()
            }
        }
    }

    /// Attach the finalized video once the context has been released.
    pub fn after_release(&self, record: &TestRecord) -> Vec<ArtifactRecord> {
        let Some(sink) = &self.sink else {
            return Vec::new();
        };
        if record.report_for(TestPhase::Call).is_none() {
            return Vec::new();
        }
        let Some(video) = record.video_path.as_ref() else {
            return Vec::new();
        };
        if !video.exists() {
            log::debug!("Video for {} not found at {}", record.name, video.display());
            return Vec::new();
        }

        match sink.attach_file(video, "Video", AttachmentType::Webm) {
            Ok(()) => vec![ArtifactRecord {
                path: video.clone(),
                name: "Video".to_string(),
                kind: ArtifactKind::Video,
            }],
            Err(e) => {
                log::warn!("Video attachment failed for {}: {:#}", record.name, e);
                Vec::new()
            }
        }
    }
}
