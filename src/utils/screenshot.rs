use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;

use crate::driver::traits::Page;
use crate::report::{AttachmentType, ReportSink};

pub const DEFAULT_PREFIX: &str = "screenshot";

/// Captures timestamped PNGs into the screenshot directory.
///
/// Capture never fails the caller: errors are logged and the intended
/// path is still returned.
#[derive(Clone)]
pub struct ScreenshotTaker {
    dir: PathBuf,
    sink: Option<Arc<dyn ReportSink>>,
}

impl ScreenshotTaker {
    pub fn new(dir: PathBuf, sink: Option<Arc<dyn ReportSink>>) -> Self {
        Self { dir, sink }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Save `{name}_{YYYYMMDD_HHMMSS}.png` and optionally attach it.
    pub async fn capture(
        &self,
        page: &dyn Page,
        name: Option<&str>,
        full_page: bool,
        attach: bool,
    ) -> PathBuf {
        let prefix = sanitize(name.unwrap_or(DEFAULT_PREFIX));
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.dir.join(format!("{}_{}.png", prefix, timestamp));

        if let Err(e) = page.screenshot(&path, full_page).await {
            log::error!("Failed to capture screenshot {}: {:#}", path.display(), e);
            return path;
        }
        log::info!("Screenshot saved: {}", path.display());

        if attach {
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.attach_file(&path, &prefix, AttachmentType::Png) {
                    log::warn!("Failed to attach screenshot {}: {:#}", path.display(), e);
                }
            }
        }

        path
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, Probe, RecordingSink};

    #[tokio::test]
    async fn test_capture_names_file_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let taker = ScreenshotTaker::new(dir.path().to_path_buf(), None);
        let page = FakePage::new(Probe::default());

        let before = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let path = taker
            .capture(&page, Some("login_failed"), true, false)
            .await;
        let after = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(
            file_name == format!("login_failed_{}.png", before)
                || file_name == format!("login_failed_{}.png", after)
        );
        assert_eq!(path.parent().unwrap(), dir.path());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_capture_failure_still_returns_path() {
        let dir = tempfile::tempdir().unwrap();
        let taker = ScreenshotTaker::new(dir.path().to_path_buf(), None);
        let page = FakePage::new(Probe::default()).fail_screenshots();

        let path = taker.capture(&page, None, false, true).await;

        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("screenshot_"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_attach_only_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let taker = ScreenshotTaker::new(dir.path().to_path_buf(), Some(sink.clone()));
        let page = FakePage::new(Probe::default());

        taker.capture(&page, Some("home"), false, false).await;
        assert!(sink.attachments().is_empty());

        taker.capture(&page, Some("home"), false, true).await;
        let attachments = sink.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].1, "home");
        assert_eq!(attachments[0].2, AttachmentType::Png);
    }

    #[test]
    fn test_sanitize_path_separators() {
        assert_eq!(sanitize("checkout/step 1"), "checkout_step 1");
        assert_eq!(sanitize("  "), "screenshot");
    }
}
