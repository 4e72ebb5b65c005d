//! Allure results directory sink
//!
//! Writes `{uuid}-result.json` per test plus copies of attached files as
//! `{uuid}-attachment.{ext}`, which the Allure CLI renders into a report.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{AttachmentType, ReportSink};
use crate::runner::state::TestOutcome;
use crate::utils::config::RunConfiguration;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AllureAttachment {
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub mime: String,
}

#[derive(Debug, Clone, Serialize)]
struct AllureLabel {
    name: &'static str,
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct StatusDetails {
    message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllureResult {
    uuid: String,
    history_id: String,
    name: String,
    full_name: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_details: Option<StatusDetails>,
    stage: &'static str,
    start: i64,
    stop: i64,
    attachments: Vec<AllureAttachment>,
    labels: Vec<AllureLabel>,
}

struct RunningTest {
    uuid: String,
    name: String,
    start: i64,
    attachments: Vec<AllureAttachment>,
}

pub struct AllureSink {
    dir: PathBuf,
    suite: String,
    current: Mutex<Option<RunningTest>>,
}

impl AllureSink {
    /// Probe the results directory once at startup.
    ///
    /// Returns `None` when it cannot be created or written, in which case
    /// the run proceeds without a sink.
    pub fn probe(dir: &Path, config: &RunConfiguration) -> Option<Self> {
        match Self::open(dir, config) {
            Ok(sink) => {
                log::info!("Allure results: {}", dir.display());
                Some(sink)
            }
            Err(e) => {
                log::warn!("Report sink unavailable, attachments disabled: {:#}", e);
                None
            }
        }
    }

    fn open(dir: &Path, config: &RunConfiguration) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let properties = format!(
            "ENV={}\nBASE_URL={}\nBROWSER={}\nHEADLESS={}\n",
            config.env, config.base_url, config.browser.browser_type, config.browser.headless
        );
        fs::write(dir.join("environment.properties"), properties)
            .with_context(|| format!("{} is not writable", dir.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            suite: config.env.clone(),
            current: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

fn status(outcome: &TestOutcome) -> &'static str {
    match outcome {
        TestOutcome::Passed => "passed",
        TestOutcome::Failed { .. } => "failed",
        TestOutcome::Errored { .. } => "broken",
        TestOutcome::Skipped { .. } => "skipped",
    }
}

impl ReportSink for AllureSink {
    fn start_test(&self, name: &str) -> Result<()> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = Some(RunningTest {
            uuid: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            start: Self::now_millis(),
            attachments: Vec::new(),
        });
        Ok(())
    }

    fn attach_file(&self, path: &Path, name: &str, kind: AttachmentType) -> Result<()> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let Some(test) = current.as_mut() else {
            bail!("No test in progress to attach {} to", name);
        };

        let source = format!("{}-attachment.{}", uuid::Uuid::new_v4(), kind.extension());
        fs::copy(path, self.dir.join(&source))
            .with_context(|| format!("Failed to copy attachment {}", path.display()))?;

        test.attachments.push(AllureAttachment {
            name: name.to_string(),
            source,
            mime: kind.mime().to_string(),
        });
        Ok(())
    }

    fn finish_test(&self, name: &str, outcome: &TestOutcome) -> Result<()> {
        let test = {
            let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
            current.take()
        };
        let Some(test) = test.filter(|t| t.name == name) else {
            bail!("Test {} was never started", name);
        };

        let result = AllureResult {
            history_id: format!("{}.{}", self.suite, test.name),
            full_name: format!("lumi_harness.{}.{}", self.suite, test.name),
            uuid: test.uuid,
            name: test.name,
            status: status(outcome),
            status_details: outcome.message().map(|m| StatusDetails {
                message: m.to_string(),
            }),
            stage: "finished",
            start: test.start,
            stop: Self::now_millis(),
            attachments: test.attachments,
            labels: vec![
                AllureLabel {
                    name: "framework",
                    value: "lumi-harness".to_string(),
                },
                AllureLabel {
                    name: "suite",
                    value: self.suite.clone(),
                },
            ],
        };

        let path = self.dir.join(format!("{}-result.json", result.uuid));
        fs::write(&path, serde_json::to_string_pretty(&result)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
