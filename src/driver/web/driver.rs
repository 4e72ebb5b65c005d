//! Playwright-backed browser driver
//!
//! Implements the launcher/browser/context/page seams on top of the
//! Playwright library. Everything above this module only sees the traits.

use anyhow::{Context, Result};
use async_trait::async_trait;
use playwright::api::browser_type::RecordVideo;
use playwright::api::{
    Browser as PwBrowser, BrowserContext as PwContext, DocumentLoadState, Page as PwPage,
    Viewport,
};
use playwright::Playwright;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use crate::driver::traits::{
    Browser, BrowserLauncher, BrowserType, BrowsingContext, ContextOptions, LaunchOptions, Page,
};
use crate::error::LaunchError;

/// Fragments of the Playwright error raised when the browser binary is absent.
const MISSING_EXECUTABLE_MARKERS: [&str; 2] = [
    "Executable doesn't exist",
    "was just installed or updated",
];

/// Map a Playwright launch error message onto a typed launch error.
pub fn classify_launch_error(message: &str) -> LaunchError {
    if MISSING_EXECUTABLE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        LaunchError::BinaryMissing(message.to_string())
    } else {
        LaunchError::Other(message.to_string())
    }
}

/// Launches browsers through a lazily initialized Playwright driver.
#[derive(Default)]
pub struct PlaywrightLauncher {
    playwright: OnceCell<Playwright>,
}

impl PlaywrightLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn playwright(&self) -> Result<&Playwright, LaunchError> {
        self.playwright
            .get_or_try_init(|| async {
                Playwright::initialize().await.map_err(|e| {
                    LaunchError::Other(format!("Failed to initialize Playwright: {}", e))
                })
            })
            .await
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>, LaunchError> {
        let playwright = self.playwright().await?;

        let engine = match options.browser_type {
            BrowserType::Chromium => playwright.chromium(),
            BrowserType::Firefox => playwright.firefox(),
            BrowserType::Webkit => playwright.webkit(),
        };

        let executable = match options.browser_type {
            BrowserType::Chromium => std::env::var("PLAYWRIGHT_CHROMIUM_EXECUTABLE_PATH")
                .ok()
                .map(PathBuf::from),
            _ => None,
        };

        let args: Vec<String> = match options.browser_type {
            BrowserType::Chromium => [
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage",
                "--ignore-certificate-errors",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            _ => Vec::new(),
        };

        let mut launcher = engine
            .launcher()
            .headless(options.headless)
            .timeout(options.timeout_ms as f64);

        if options.slow_mo_ms > 0 {
            launcher = launcher.slowmo(options.slow_mo_ms as f64);
        }
        if let Some(ref path) = executable {
            log::info!("Using browser from env: {}", path.display());
            launcher = launcher.executable(path);
        }
        if !args.is_empty() {
            launcher = launcher.args(&args);
        }

        let browser = launcher
            .launch()
            .await
            .map_err(|e| classify_launch_error(&e.to_string()))?;

        log::info!(
            "Launched {} (headless: {}, slow_mo: {}ms)",
            options.browser_type,
            options.headless,
            options.slow_mo_ms
        );

        Ok(Box::new(PlaywrightBrowser {
            browser,
            name: options.browser_type.to_string(),
        }))
    }

    async fn install(&self, browser_type: BrowserType) -> Result<()> {
        let playwright = self.playwright().await?;
        log::info!("Installing Playwright {} ...", browser_type);

        match browser_type {
            BrowserType::Chromium => playwright.install_chromium(),
            BrowserType::Firefox => playwright.install_firefox(),
            BrowserType::Webkit => playwright.install_webkit(),
        }
        .with_context(|| format!("Failed to install {}", browser_type))?;

        log::info!("Playwright {} installed", browser_type);
        Ok(())
    }
}

pub struct PlaywrightBrowser {
    browser: PwBrowser,
    name: String,
}

#[async_trait]
impl Browser for PlaywrightBrowser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn new_context(&self, options: &ContextOptions) -> Result<Box<dyn BrowsingContext>> {
        std::fs::create_dir_all(&options.video_dir).with_context(|| {
            format!("Failed to create video dir {}", options.video_dir.display())
        })?;

        let context = self
            .browser
            .context_builder()
            .record_video(RecordVideo {
                dir: &options.video_dir,
                size: Some(Viewport {
                    width: options.video_size.width as i32,
                    height: options.video_size.height as i32,
                }),
            })
            .build()
            .await
            .context("Failed to create browser context")?;

        Ok(Box::new(PlaywrightContext {
            context,
            timeout_ms: options.timeout_ms,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.browser
            .close()
            .await
            .context("Failed to close browser")?;
        Ok(())
    }
}

pub struct PlaywrightContext {
    context: PwContext,
    timeout_ms: u64,
}

#[async_trait]
impl BrowsingContext for PlaywrightContext {
    async fn new_page(&self) -> Result<Arc<dyn Page>> {
        let page = self
            .context
            .new_page()
            .await
            .context("Failed to open page")?;

        Ok(Arc::new(PlaywrightPage {
            page: Mutex::new(page),
            timeout_ms: self.timeout_ms as f64,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.context
            .close()
            .await
            .context("Failed to close browser context")?;
        Ok(())
    }
}

/// Page handle; the mutex keeps operations on one page strictly sequential.
pub struct PlaywrightPage {
    page: Mutex<PwPage>,
    timeout_ms: f64,
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .wait_until(DocumentLoadState::NetworkIdle)
            .timeout(self.timeout_ms)
            .goto()
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page.url()?)
    }

    async fn title(&self) -> Result<String> {
        let page = self.page.lock().await;
        Ok(page.title().await?)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.click_builder(selector)
            .timeout(self.timeout_ms)
            .click()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to click: {}. Error: {:?}", selector, e))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let page = self.page.lock().await;
        page.fill_builder(selector, value)
            .timeout(self.timeout_ms)
            .fill()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fill: {}. Error: {:?}", selector, e))?;
        Ok(())
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let page = self.page.lock().await;
        let elements = page.query_selector_all(selector).await?;
        Ok(elements.len())
    }

    async fn text(&self, selector: &str) -> Result<String> {
        let page = self.page.lock().await;
        let js = "el => el.value || el.innerText || el.textContent || ''";
        let text = page
            .evaluate_on_selector::<String, _>(selector, js, None::<String>)
            .await
            .with_context(|| format!("Failed to read text of {}", selector))?;
        Ok(text)
    }

    async fn screenshot(&self, path: &Path, full_page: bool) -> Result<()> {
        let page = self.page.lock().await;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        page.screenshot_builder()
            .path(path.to_path_buf())
            .full_page(full_page)
            .screenshot()
            .await?;
        Ok(())
    }

    async fn video_path(&self) -> Result<Option<PathBuf>> {
        let page = self.page.lock().await;
        match page.video()? {
            Some(video) => Ok(Some(video.path()?)),
            None => Ok(None),
        }
    }
}
