//! Session and resource lifecycle manager
//!
//! Owns the session browser and database connection, and drives every
//! test through setup, body and teardown:
//!
//! ```text
//! NotStarted -> ContextAcquired -> PageOpen -> ScenarioRuns
//!   -> {Passed | Failed | Errored} -> ArtifactsCaptured -> ContextReleased -> Done
//! ```
//!
//! Artifact capture and context release run on every path out of the
//! body, including errors and panics.

use anyhow::{Context, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::events::{EventEmitter, TestEvent};
use super::hooks::ReportingHook;
use super::scenario::{Fixture, FixtureSet, Scenario};
use super::scope::{ContextLease, DbHandle, TestScope};
use super::state::{
    ArtifactKind, ArtifactRecord, LifecycleState, PhaseReport, TestOutcome, TestPhase,
    TestRecord, TestSessionState, FAILURE_SCREENSHOT,
};
use crate::db::{acquire_connection, Database, DbConnector, DbCursor};
use crate::driver::traits::{
    Browser, BrowserLauncher, ContextOptions, LaunchOptions, DEFAULT_VIDEO_SIZE,
};
use crate::error::LaunchError;
use crate::report::types::TestResults;
use crate::report::ReportSink;
use crate::utils::config::RunConfiguration;
use crate::utils::logger::LogHandle;
use crate::utils::paths::ArtifactPaths;
use crate::utils::screenshot::ScreenshotTaker;

/// Owns the session browser until it is closed.
///
/// Dropping an unclosed lease schedules the close on the current runtime.
pub struct BrowserLease {
    browser: Option<Box<dyn Browser>>,
}

impl BrowserLease {
    pub fn new(browser: Box<dyn Browser>) -> Self {
        Self {
            browser: Some(browser),
        }
    }

    pub fn get(&self) -> Option<&dyn Browser> {
        self.browser.as_deref()
    }

    pub async fn close(mut self) -> Result<()> {
        match self.browser.take() {
            Some(browser) => browser.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        let Some(browser) = self.browser.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = browser.close().await {
                        log::warn!("Failed to close abandoned browser: {:#}", e);
                    }
                });
            }
            Err(_) => log::error!("Browser dropped outside a runtime and left running"),
        }
    }
}

/// Session browser state
pub enum BrowserSlot {
    /// Not launched yet; the first test that needs it launches it
    Idle,
    Ready(BrowserLease),
    /// Binary missing and remediation failed: dependents skip
    Unavailable(String),
    /// Launch failed for another reason: dependents error
    Failed(String),
    Closed,
}

impl BrowserSlot {
    pub fn browser(&self) -> Option<&dyn Browser> {
        match self {
            BrowserSlot::Ready(lease) => lease.get(),
            _ => None,
        }
    }
}

enum DbSlot {
    Idle,
    Ready(Box<dyn Database>),
    Unavailable(String),
    Closed,
}

/// Launch the session browser, installing it once if the binary is missing.
pub async fn acquire_browser(launcher: &dyn BrowserLauncher, options: &LaunchOptions) -> BrowserSlot {
    match launcher.launch(options).await {
        Ok(browser) => BrowserSlot::Ready(BrowserLease::new(browser)),
        Err(LaunchError::BinaryMissing(message)) => {
            log::warn!("{} is not installed ({}), installing", options.browser_type, message);
            if let Err(e) = launcher.install(options.browser_type).await {
                log::error!("Browser install failed: {:#}", e);
                return BrowserSlot::Unavailable(format!(
                    "Browser {} is unavailable: install failed: {:#}",
                    options.browser_type, e
                ));
            }
            match launcher.launch(options).await {
                Ok(browser) => BrowserSlot::Ready(BrowserLease::new(browser)),
                Err(e) => {
                    log::error!("Browser launch failed after install: {}", e);
                    BrowserSlot::Unavailable(format!(
                        "Browser {} is unavailable after install: {}",
                        options.browser_type, e
                    ))
                }
            }
        }
        Err(e @ LaunchError::Other(_)) => {
            log::error!("{}", e);
            BrowserSlot::Failed(e.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// One test session: shared browser, shared database connection, and the
/// results of every test run so far.
pub struct Session {
    config: RunConfiguration,
    paths: ArtifactPaths,
    launcher: Arc<dyn BrowserLauncher>,
    browser: BrowserSlot,
    connector: Arc<dyn DbConnector>,
    db: DbSlot,
    sink: Option<Arc<dyn ReportSink>>,
    screenshots: ScreenshotTaker,
    hook: ReportingHook,
    emitter: EventEmitter,
    state: TestSessionState,
    log: Option<LogHandle>,
}

impl Session {
    pub fn new(
        config: RunConfiguration,
        launcher: Arc<dyn BrowserLauncher>,
        connector: Arc<dyn DbConnector>,
    ) -> Self {
        let paths = config.paths();
        let screenshots = ScreenshotTaker::new(paths.screenshots.clone(), None);
        let session_id = uuid::Uuid::new_v4().to_string();

        Self {
            hook: ReportingHook::new(None, screenshots.clone()),
            config,
            paths,
            launcher,
            browser: BrowserSlot::Idle,
            connector,
            db: DbSlot::Idle,
            sink: None,
            screenshots,
            emitter: EventEmitter::default(),
            state: TestSessionState::new(&session_id),
            log: None,
        }
    }

    /// Use the probed report sink, if any, for screenshots and the hook.
    pub fn with_sink(mut self, sink: Option<Arc<dyn ReportSink>>) -> Self {
        self.screenshots = ScreenshotTaker::new(self.paths.screenshots.clone(), sink.clone());
        self.hook = ReportingHook::new(sink.clone(), self.screenshots.clone());
        self.sink = sink;
        self
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_log(mut self, log: LogHandle) -> Self {
        self.log = Some(log);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn start(&mut self) {
        self.state.start();
        if let Some(log) = &self.log {
            log::debug!("Session {} logging to {}", self.state.session_id, log.log_file.display());
        }
        log::info!(
            "Session {} started (env: {})",
            self.state.session_id,
            self.config.env
        );
        self.emitter.emit(TestEvent::SessionStarted {
            session_id: self.state.session_id.clone(),
            env: self.config.env.clone(),
        });
    }

    fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            browser_type: self.config.browser.browser_type,
            headless: self.config.browser.headless,
            slow_mo_ms: self.config.browser.slow_mo_ms,
            timeout_ms: self.config.browser.timeout_ms,
        }
    }

    async fn ensure_browser(&mut self) -> Result<(), TestOutcome> {
        if matches!(self.browser, BrowserSlot::Idle) {
            let options = self.launch_options();
            self.browser = acquire_browser(self.launcher.as_ref(), &options).await;
        }

        match &self.browser {
            BrowserSlot::Ready(_) => Ok(()),
            BrowserSlot::Unavailable(reason) => Err(TestOutcome::Skipped {
                reason: reason.clone(),
            }),
            BrowserSlot::Failed(message) => Err(TestOutcome::Errored {
                message: message.clone(),
            }),
            BrowserSlot::Idle | BrowserSlot::Closed => Err(TestOutcome::Errored {
                message: "Browser session is closed".to_string(),
            }),
        }
    }

    async fn ensure_db(&mut self) -> Result<(), String> {
        if matches!(self.db, DbSlot::Idle) {
            self.db = match acquire_connection(
                self.connector.as_ref(),
                &self.config.database,
                &self.config.env,
            )
            .await
            {
                Ok(db) => DbSlot::Ready(db),
                Err(reason) => {
                    log::warn!("{}", reason);
                    DbSlot::Unavailable(reason)
                }
            };
        }

        match &self.db {
            DbSlot::Ready(_) => Ok(()),
            DbSlot::Unavailable(reason) => Err(reason.clone()),
            DbSlot::Idle | DbSlot::Closed => Err("Database connection is closed".to_string()),
        }
    }

    async fn open_page(&self, record: &mut TestRecord) -> Result<()> {
        let browser = self
            .browser
            .browser()
            .context("Browser is not available")?;
        let options = ContextOptions {
            video_dir: self.paths.videos.clone(),
            video_size: DEFAULT_VIDEO_SIZE,
            timeout_ms: self.config.browser.timeout_ms,
        };

        let context = browser.new_context(&options).await?;
        record.context = Some(ContextLease::new(context));
        record.transition(LifecycleState::ContextAcquired);

        let page = record
            .context
            .as_ref()
            .and_then(|lease| lease.context())
            .context("Browser context is closed")?
            .new_page()
            .await?;
        record.video_path = match page.video_path().await {
            Ok(path) => path,
            Err(e) => {
                log::debug!("No video path for {}: {:#}", record.name, e);
                None
            }
        };
        record.page = Some(page);
        record.transition(LifecycleState::PageOpen);
        Ok(())
    }

    /// Acquire what the fixtures need. Environment preconditions that do not
    /// hold come back as a skip.
    async fn setup(&mut self, fixtures: &FixtureSet, record: &mut TestRecord) -> TestOutcome {
        if fixtures.needs_db() {
            if let Err(reason) = self.ensure_db().await {
                return TestOutcome::Skipped { reason };
            }
        }
        if fixtures.needs_browser() {
            if let Err(outcome) = self.ensure_browser().await {
                return outcome;
            }
        }
        if fixtures.contains(Fixture::Page) {
            if let Err(e) = self.open_page(record).await {
                return TestOutcome::Errored {
                    message: format!("Failed to open page: {:#}", e),
                };
            }
        }
        TestOutcome::Passed
    }

    /// Run one scenario through the full lifecycle and return its outcome.
    pub async fn run_test(&mut self, scenario: &dyn Scenario) -> TestOutcome {
        let name = scenario.name().to_string();
        let fixtures = FixtureSet::resolve(&scenario.fixtures());
        let mut record = TestRecord::new(&name);
        record.start();

        log::info!("Starting test: {}", name);
        self.emitter.emit(TestEvent::TestStarted { name: name.clone() });
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.start_test(&name) {
                log::warn!("Report sink could not start {}: {:#}", name, e);
            }
        }

        let mut setup = self.setup(&fixtures, &mut record).await;
        let mut teardown_errors: Vec<String> = Vec::new();

        let Session {
            config,
            browser,
            db,
            sink,
            screenshots,
            hook,
            emitter,
            state,
            ..
        } = &mut *self;

        if setup.is_passed() {
            let conn: Option<&mut dyn Database> = match db {
                DbSlot::Ready(conn) if fixtures.needs_db() => Some(&mut **conn),
                _ => None,
            };
            let handle = match conn {
                Some(conn) if fixtures.contains(Fixture::DbCursor) => {
                    match DbCursor::open(conn).await {
                        Ok(cursor) => Some(DbHandle::Cursor(cursor)),
                        Err(e) => {
                            setup = TestOutcome::Errored {
                                message: format!("Failed to open database cursor: {:#}", e),
                            };
                            None
                        }
                    }
                }
                Some(conn) => Some(DbHandle::Connection(conn)),
                None => None,
            };

            if setup.is_passed() {
                record.push_report(PhaseReport::new(TestPhase::Setup, TestOutcome::Passed));
                record.transition(LifecycleState::ScenarioRuns);

                let mut scope = TestScope::new(
                    &name,
                    config,
                    &fixtures,
                    browser.browser(),
                    record.page.clone(),
                    screenshots,
                    handle,
                );
                let run = AssertUnwindSafe(scenario.run(&mut scope))
                    .catch_unwind()
                    .await;
                let handle = scope.into_db();

                let (call, body_result) = match run {
                    Ok(Ok(())) => (TestOutcome::Passed, Ok(())),
                    Ok(Err(e)) => (
                        TestOutcome::Failed {
                            message: format!("{:#}", e),
                        },
                        Err(e),
                    ),
                    Err(payload) => {
                        let message = panic_message(&*payload);
                        (
                            TestOutcome::Errored {
                                message: message.clone(),
                            },
                            Err(anyhow::anyhow!(message)),
                        )
                    }
                };
                record.transition(match call {
                    TestOutcome::Passed => LifecycleState::Passed,
                    TestOutcome::Failed { .. } => LifecycleState::Failed,
                    _ => LifecycleState::Errored,
                });

                if call.is_failure() && config.browser.screenshot_on_failure {
                    if let Some(page) = record.page.clone() {
                        let path = screenshots
                            .capture(page.as_ref(), Some(&format!("{}_failed", name)), true, false)
                            .await;
                        if path.exists() {
                            record.artifacts.push(ArtifactRecord {
                                path,
                                name: FAILURE_SCREENSHOT.to_string(),
                                kind: ArtifactKind::Screenshot,
                            });
                        }
                    }
                }

                let report = PhaseReport::new(TestPhase::Call, call.clone());
                record.push_report(report.clone());
                let captured = hook.on_report(&report, &record).await;
                record.artifacts.extend(captured);
                record.transition(LifecycleState::ArtifactsCaptured);

                if let Some(DbHandle::Cursor(cursor)) = handle {
                    if let Err(e) = cursor.finish(body_result).await {
                        if call.is_passed() {
                            teardown_errors.push(format!("Database commit failed: {:#}", e));
                        }
                    }
                }
            }
        }

        if !setup.is_passed() {
            match &setup {
                TestOutcome::Skipped { reason } => log::warn!("Skipping {}: {}", name, reason),
                other => log::error!("Setup of {} failed: {}", name, other.message().unwrap_or_default()),
            }
            record.push_report(PhaseReport::new(TestPhase::Setup, setup));
        }

        record.page = None;
        if let Some(lease) = record.context.take() {
            if let Err(e) = lease.release().await {
                teardown_errors.push(format!("Failed to close browser context: {:#}", e));
            }
            record.transition(LifecycleState::ContextReleased);
        }
        let videos = hook.after_release(&record);
        record.artifacts.extend(videos);

        let teardown = if teardown_errors.is_empty() {
            TestOutcome::Passed
        } else {
            TestOutcome::Errored {
                message: teardown_errors.join("; "),
            }
        };
        record.push_report(PhaseReport::new(TestPhase::Teardown, teardown));
        record.transition(LifecycleState::Done);
        record.finish();

        let outcome = record.outcome();
        log::info!("Finished test: {} [{}]", name, outcome.label());
        if let Some(sink) = sink {
            if let Err(e) = sink.finish_test(&name, &outcome) {
                log::warn!("Report sink could not finish {}: {:#}", name, e);
            }
        }
        emitter.emit(TestEvent::TestFinished {
            name,
            outcome: outcome.clone(),
            duration_ms: record.duration_ms,
        });
        state.add_test(record.to_report());

        outcome
    }

    /// Close the browser and the database connection, exactly once each,
    /// and hand back the collected results.
    pub async fn finish(mut self) -> TestResults {
        if let BrowserSlot::Ready(lease) = std::mem::replace(&mut self.browser, BrowserSlot::Closed) {
            match lease.close().await {
                Ok(()) => log::info!("Browser closed"),
                Err(e) => log::warn!("Failed to close browser: {:#}", e),
            }
        }
        if let DbSlot::Ready(db) = std::mem::replace(&mut self.db, DbSlot::Closed) {
            match db.close().await {
                Ok(()) => log::info!("Database connection closed"),
                Err(e) => log::warn!("Failed to close database connection: {:#}", e),
            }
        }

        self.state.finish();
        let summary = self.state.summary();
        self.emitter.emit(TestEvent::SessionFinished {
            summary: summary.clone(),
        });

        TestResults {
            session_id: self.state.session_id,
            env: self.config.env,
            base_url: self.config.base_url,
            tests: self.state.tests,
            summary,
            generated_at: chrono::Local::now().to_rfc3339(),
        }
    }
}
