//! In-memory fakes for the browser, database and report seams.
//!
//! Every fake records what happened into a shared [`Probe`] so tests can
//! assert on call counts.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::db::{Database, DbConnector, DbKind, DbRow};
use crate::driver::traits::{
    Browser, BrowserLauncher, BrowserType, BrowsingContext, ContextOptions, LaunchOptions, Page,
};
use crate::error::LaunchError;
use crate::report::{AttachmentType, ReportSink};
use crate::runner::scenario::{Fixture, Scenario};
use crate::runner::scope::TestScope;
use crate::runner::state::TestOutcome;
use crate::utils::config::{DbSettings, RunConfiguration};

/// Shared call log
#[derive(Debug, Clone, Default)]
pub struct Probe {
    events: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn record(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }

    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == event)
            .count()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

/// Configuration rooted at `dir` with a complete database section.
pub fn test_config(dir: &Path) -> RunConfiguration {
    let vars: HashMap<&str, String> = HashMap::from([
        ("HEADLESS", "true".to_string()),
        ("SLOW_MO", "0".to_string()),
        ("PAGE_TIMEOUT", "30000".to_string()),
        ("DB_HOST", "localhost".to_string()),
        ("DB_PORT", "5432".to_string()),
        ("DB_USER", "app".to_string()),
        ("DB_PASS", "secret".to_string()),
        ("DB_NAME", "app_test".to_string()),
        ("REPORT_PATH", dir.to_string_lossy().to_string()),
    ]);
    RunConfiguration::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub struct FakeLauncher {
    probe: Probe,
    launches: Mutex<VecDeque<LaunchError>>,
    fail_install: bool,
    fail_context_close: bool,
}

impl FakeLauncher {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            launches: Mutex::new(VecDeque::new()),
            fail_install: false,
            fail_context_close: false,
        }
    }

    /// Fail the next launch attempt with `error`. Can be stacked.
    pub fn fail_next_launch(self, error: LaunchError) -> Self {
        self.launches.lock().unwrap().push_back(error);
        self
    }

    pub fn fail_install(mut self) -> Self {
        self.fail_install = true;
        self
    }

    pub fn fail_context_close(mut self) -> Self {
        self.fail_context_close = true;
        self
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>, LaunchError> {
        self.probe.record("launcher.launch");
        if let Some(error) = self.launches.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Box::new(FakeBrowser {
            probe: self.probe.clone(),
            name: options.browser_type.to_string(),
            fail_context_close: self.fail_context_close,
        }))
    }

    async fn install(&self, _browser_type: BrowserType) -> Result<()> {
        self.probe.record("launcher.install");
        if self.fail_install {
            bail!("download failed");
        }
        Ok(())
    }
}

pub struct FakeBrowser {
    probe: Probe,
    name: String,
    fail_context_close: bool,
}

#[async_trait]
impl Browser for FakeBrowser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn new_context(&self, options: &ContextOptions) -> Result<Box<dyn BrowsingContext>> {
        self.probe.record("browser.new_context");
        let mut context = FakeContext::new(self.probe.clone());
        context.video_dir = Some(options.video_dir.clone());
        context.fail_close = self.fail_context_close;
        Ok(Box::new(context))
    }

    async fn close(&self) -> Result<()> {
        self.probe.record("browser.close");
        Ok(())
    }
}

/// Context whose close writes out the video of its page, like a real
/// browser finalizing the recording.
pub struct FakeContext {
    probe: Probe,
    video_dir: Option<PathBuf>,
    videos: Mutex<Vec<PathBuf>>,
    fail_close: bool,
}

impl FakeContext {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            video_dir: None,
            videos: Mutex::new(Vec::new()),
            fail_close: false,
        }
    }
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        self.probe.record("context.new_page");
        let mut page = FakePage::new(self.probe.clone());
        if let Some(dir) = &self.video_dir {
            let video = dir.join(format!("{}.webm", uuid::Uuid::new_v4()));
            self.videos.lock().unwrap().push(video.clone());
            page = page.with_video(video);
        }
        Ok(Arc::new(page))
    }

    async fn close(&self) -> Result<()> {
        self.probe.record("context.close");
        for video in self.videos.lock().unwrap().iter() {
            if let Some(parent) = video.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(video, b"webm")?;
        }
        if self.fail_close {
            bail!("context close timed out");
        }
        Ok(())
    }
}

pub struct FakePage {
    probe: Probe,
    url: Mutex<String>,
    video: Option<PathBuf>,
    fail_screenshots: bool,
}

impl FakePage {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            url: Mutex::new("about:blank".to_string()),
            video: None,
            fail_screenshots: false,
        }
    }

    pub fn with_video(mut self, path: PathBuf) -> Self {
        self.video = Some(path);
        self
    }

    pub fn fail_screenshots(mut self) -> Self {
        self.fail_screenshots = true;
        self
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.probe.record("page.goto");
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String> {
        Ok("Fake Page".to_string())
    }

    async fn click(&self, _selector: &str) -> Result<()> {
        self.probe.record("page.click");
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<()> {
        self.probe.record("page.fill");
        Ok(())
    }

    async fn count(&self, _selector: &str) -> Result<usize> {
        Ok(1)
    }

    async fn text(&self, _selector: &str) -> Result<String> {
        Ok(String::new())
    }

    async fn screenshot(&self, path: &Path, _full_page: bool) -> Result<()> {
        self.probe.record("page.screenshot");
        if self.fail_screenshots {
            bail!("page crashed");
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"\x89PNG")?;
        Ok(())
    }

    async fn video_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.video.clone())
    }
}

pub struct FakeDatabase {
    probe: Probe,
    fail_commit: bool,
    fail_rollback: bool,
}

impl FakeDatabase {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            fail_commit: false,
            fail_rollback: false,
        }
    }

    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }
}

#[async_trait]
impl Database for FakeDatabase {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    async fn execute(&mut self, _sql: &str, _params: &[String]) -> Result<u64> {
        self.probe.record("db.execute");
        Ok(1)
    }

    async fn fetch_all(&mut self, _sql: &str, _params: &[String]) -> Result<Vec<DbRow>> {
        self.probe.record("db.fetch");
        Ok(vec![DbRow::new(vec![(
            "?column?".to_string(),
            serde_json::json!(1),
        )])])
    }

    async fn begin(&mut self) -> Result<()> {
        self.probe.record("db.begin");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.probe.record("db.commit");
        if self.fail_commit {
            bail!("could not serialize access");
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.probe.record("db.rollback");
        if self.fail_rollback {
            bail!("connection reset");
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.probe.record("db.close");
        Ok(())
    }
}

pub struct FakeConnector {
    probe: Probe,
    failure: Option<String>,
}

impl FakeConnector {
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            failure: None,
        }
    }

    pub fn failing(probe: Probe, message: &str) -> Self {
        Self {
            probe,
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl DbConnector for FakeConnector {
    async fn connect(&self, _settings: &DbSettings) -> Result<Box<dyn Database>> {
        self.probe.record("db.connect");
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok(Box::new(FakeDatabase::new(self.probe.clone())))
    }
}

/// Sink that remembers every call.
#[derive(Default)]
pub struct RecordingSink {
    attachments: Mutex<Vec<(PathBuf, String, AttachmentType)>>,
    finished: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub fn attachments(&self) -> Vec<(PathBuf, String, AttachmentType)> {
        self.attachments.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<(String, String)> {
        self.finished.lock().unwrap().clone()
    }
}

impl ReportSink for RecordingSink {
    fn start_test(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn attach_file(&self, path: &Path, name: &str, kind: AttachmentType) -> Result<()> {
        self.attachments
            .lock()
            .unwrap()
            .push((path.to_path_buf(), name.to_string(), kind));
        Ok(())
    }

    fn finish_test(&self, name: &str, outcome: &TestOutcome) -> Result<()> {
        self.finished
            .lock()
            .unwrap()
            .push((name.to_string(), outcome.label().to_string()));
        Ok(())
    }
}

/// Sink whose every call fails.
pub struct FailingSink;

impl ReportSink for FailingSink {
    fn start_test(&self, _name: &str) -> Result<()> {
        bail!("sink offline")
    }

    fn attach_file(&self, _path: &Path, _name: &str, _kind: AttachmentType) -> Result<()> {
        bail!("sink offline")
    }

    fn finish_test(&self, _name: &str, _outcome: &TestOutcome) -> Result<()> {
        bail!("sink offline")
    }
}

/// What a [`ScriptedScenario`] does with its scope
#[derive(Debug, Clone)]
pub enum Step {
    Pass,
    Fail(&'static str),
    Panic(&'static str),
    /// Navigate to the base URL
    Visit,
    /// Insert through the cursor
    Insert,
    /// Insert through the cursor, then fail
    InsertThenFail,
    /// Never completes
    Hang,
}

pub struct ScriptedScenario {
    name: String,
    fixtures: Vec<Fixture>,
    step: Step,
    probe: Option<Probe>,
}

impl ScriptedScenario {
    pub fn new(name: &str, fixtures: Vec<Fixture>, step: Step) -> Self {
        Self {
            name: name.to_string(),
            fixtures,
            step,
            probe: None,
        }
    }

    /// Record `scenario.body` into `probe` whenever the body runs.
    pub fn observed(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }
}

#[async_trait]
impl Scenario for ScriptedScenario {
    fn name(&self) -> &str {
        &self.name
    }

    fn fixtures(&self) -> Vec<Fixture> {
        self.fixtures.clone()
    }

    async fn run(&self, scope: &mut TestScope<'_>) -> Result<()> {
        if let Some(probe) = &self.probe {
            probe.record("scenario.body");
        }
        match &self.step {
            Step::Pass => Ok(()),
            Step::Fail(message) => Err(anyhow!("{}", message)),
            Step::Panic(message) => panic!("{}", message),
            Step::Visit => {
                let url = scope.config().base_url.clone();
                scope.page()?.goto(&url).await
            }
            Step::Insert => {
                scope
                    .db_cursor()?
                    .execute("INSERT INTO users (name) VALUES ($1)", &["alice".to_string()])
                    .await?;
                Ok(())
            }
            Step::InsertThenFail => {
                scope
                    .db_cursor()?
                    .execute("INSERT INTO users (name) VALUES ($1)", &["bob".to_string()])
                    .await?;
                Err(anyhow!("constraint violated"))
            }
            Step::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}
