use crate::error::LaunchError;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Web browser engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl FromStr for BrowserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserType::Chromium),
            "firefox" => Ok(BrowserType::Firefox),
            "webkit" => Ok(BrowserType::Webkit),
            other => Err(format!("unknown browser type '{}'", other)),
        }
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrowserType::Chromium => "chromium",
            BrowserType::Firefox => "firefox",
            BrowserType::Webkit => "webkit",
        };
        f.write_str(name)
    }
}

/// Options for launching the session browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub browser_type: BrowserType,
    pub headless: bool,
    pub slow_mo_ms: u64,
    pub timeout_ms: u64,
}

/// Frame size of recorded videos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

pub const DEFAULT_VIDEO_SIZE: VideoSize = VideoSize {
    width: 1280,
    height: 720,
};

/// Options for a fresh browsing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Directory the context records its video into
    pub video_dir: PathBuf,
    pub video_size: VideoSize,
    pub timeout_ms: u64,
}

/// Starts browser processes and installs missing browser binaries.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>, LaunchError>;

    /// Install the browser binaries for `browser_type`.
    async fn install(&self, browser_type: BrowserType) -> Result<()>;
}

/// A running browser process, shared by every test of a session.
#[async_trait]
pub trait Browser: Send + Sync {
    fn name(&self) -> &str;

    async fn new_context(&self, options: &ContextOptions) -> Result<Box<dyn BrowsingContext>>;

    async fn close(&self) -> Result<()>;
}

/// Isolated cookie/storage sandbox with its own video recording.
///
/// Closing the context finalizes the video file.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    async fn new_page(&self) -> Result<Arc<dyn Page>>;

    async fn close(&self) -> Result<()>;
}

/// A navigable page inside a browsing context.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait until the network is idle.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Number of elements currently matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize>;

    async fn text(&self, selector: &str) -> Result<String>;

    /// Render the page to a PNG at `path`.
    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()>;

    /// Where the page's video is being recorded, if recording is enabled.
    async fn video_path(&self) -> Result<Option<PathBuf>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_type_parse() {
        assert_eq!("Chromium".parse::<BrowserType>(), Ok(BrowserType::Chromium));
        assert_eq!("firefox".parse::<BrowserType>(), Ok(BrowserType::Firefox));
        assert_eq!(" webkit ".parse::<BrowserType>(), Ok(BrowserType::Webkit));
        assert!("netscape".parse::<BrowserType>().is_err());
        assert_eq!(BrowserType::Webkit.to_string(), "webkit");
    }
}
