use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use researcher_common::model::PageCapture;
use researcher_common::{ResearchError, StealthLevel};
use researcher_drivers::{DriverOptions, PageSnapshot, ResearchDriver};
use url::Url;

/// One page load in an already open browser session.
///
/// The Fantoccini-backed loader is the production implementation; tests
/// drive the controller with in-memory loaders.
#[async_trait::async_trait]
pub trait PageLoader: Send {
    async fn load(&mut self, url: &Url) -> Result<PageSnapshot>;

    /// Release the underlying session. Called once by
    /// [`BrowserController::close`].
    async fn release(&mut self) -> Result<()>;
}

/// Concrete loader backed by the fantoccini-based driver.
pub struct FantocciniLoader {
    driver: Option<ResearchDriver>,
    screenshots: bool,
}

impl FantocciniLoader {
    pub async fn connect(options: DriverOptions, screenshots: bool) -> Result<Self> {
        let driver = ResearchDriver::connect(options).await?;
        Ok(Self {
            driver: Some(driver),
            screenshots,
        })
    }
}

#[async_trait::async_trait]
impl PageLoader for FantocciniLoader {
    async fn load(&mut self, url: &Url) -> Result<PageSnapshot> {
        let driver = self
            .driver
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("browser session already released"))?;
        let page = driver.goto(url).await?;
        page.snapshot(self.screenshots).await
    }

    async fn release(&mut self) -> Result<()> {
        match self.driver.take() {
            Some(driver) => driver.close().await,
            None => Ok(()),
        }
    }
}

/// Attempts per URL and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// Pause before attempt `attempt + 1`; doubles after each failure.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(6))
    }
}

/// Everything needed to open a browser session.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
    pub nav_timeout: Duration,
    pub retry: RetryPolicy,
    /// Capture a PNG per page; only needed for debug/validate runs.
    pub screenshots: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: researcher_drivers::browser::driver::DEFAULT_WEBDRIVER_URL.to_string(),
            headless: false,
            stealth: StealthLevel::default(),
            nav_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            screenshots: false,
        }
    }
}

/// Navigation with retries and per-attempt timeouts over a [`PageLoader`].
///
/// `navigate` never fails: exhausted attempts come back as a capture with
/// `success == false` and an empty body.
pub struct BrowserController<L: PageLoader> {
    loader: L,
    retry: RetryPolicy,
    nav_timeout: Duration,
}

impl BrowserController<FantocciniLoader> {
    /// Start a WebDriver session with the configured stealth posture.
    pub async fn open_session(settings: &BrowserSettings) -> researcher_common::Result<Self> {
        let options = DriverOptions {
            webdriver_url: settings.webdriver_url.clone(),
            headless: settings.headless,
            stealth: settings.stealth,
            body_wait: settings.nav_timeout,
        };
        let loader = FantocciniLoader::connect(options, settings.screenshots)
            .await
            .map_err(ResearchError::Driver)?;
        Ok(Self::with_loader(loader, settings.retry, settings.nav_timeout))
    }
}

impl<L: PageLoader> BrowserController<L> {
    pub fn with_loader(loader: L, retry: RetryPolicy, nav_timeout: Duration) -> Self {
        Self {
            loader,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            nav_timeout,
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Load `url`, retrying with backoff until the attempts are exhausted.
    pub async fn navigate(&mut self, url: &Url) -> PageCapture {
        let mut last_failure = String::new();

        for attempt in 1..=self.retry.max_attempts {
            let outcome = tokio::time::timeout(self.nav_timeout, self.loader.load(url)).await;
            let failure = match outcome {
                Ok(Ok(snapshot)) => {
                    tracing::info!(
                        target: "browser.nav",
                        %url,
                        attempt,
                        html_len = snapshot.html.len(),
                        text_len = snapshot.visible_text.len(),
                        "Page loaded"
                    );
                    return PageCapture {
                        url: url.clone(),
                        title: snapshot.title,
                        html: snapshot.html,
                        visible_text: snapshot.visible_text,
                        screenshot_png: snapshot.screenshot_png,
                        fetched_at: Utc::now(),
                        success: true,
                        attempts: attempt,
                        failure: None,
                    };
                }
                Ok(Err(err)) => format!("{err:#}"),
                Err(_) => format!("timed out after {}s", self.nav_timeout.as_secs_f32()),
            };

            tracing::warn!(
                target: "browser.nav",
                %url,
                attempt,
                max_attempts = self.retry.max_attempts,
                reason = %failure,
                "Navigation attempt failed"
            );
            last_failure = failure;

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        PageCapture::failed(url.clone(), self.retry.max_attempts, last_failure)
    }

    /// Release the browser session.
    pub async fn close(mut self) -> Result<()> {
        self.loader.release().await
    }
}
