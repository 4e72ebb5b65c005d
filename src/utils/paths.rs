use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// On-disk layout for everything a run produces, rooted at `REPORT_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub root: PathBuf,
    pub screenshots: PathBuf,
    pub videos: PathBuf,
    pub logs: PathBuf,
    pub allure_results: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            screenshots: root.join("screenshots"),
            videos: root.join("videos"),
            logs: root.join("logs"),
            allure_results: root.join("allure-results"),
        }
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs.join("app.log")
    }

    /// Create the screenshot, video and log directories.
    ///
    /// `allure-results` is left to the report sink probe.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.screenshots, &self.videos, &self.logs] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Path of a result file at the report root (e.g. `junit.xml`).
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}
