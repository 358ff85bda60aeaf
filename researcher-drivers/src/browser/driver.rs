use crate::browser::{
    behavioral::BehavioralEngine,
    fingerprint::{FingerprintPool, FingerprintProfile},
    page::ResearchPage,
    stealth::{build_stealth_arguments, chrome_capabilities, StealthScripts},
};
use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder, Locator};
use researcher_common::StealthLevel;
use std::time::Duration;
use url::Url;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Session-level settings for [`ResearchDriver::connect`].
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
    /// How long to wait for `<body>` after navigation.
    pub body_wait: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            headless: false,
            stealth: StealthLevel::default(),
            body_wait: Duration::from_secs(10),
        }
    }
}

/// Thin wrapper around a `fantoccini` WebDriver client with stealth and
/// behavioral helpers.
pub struct ResearchDriver {
    client: Client,
    options: DriverOptions,
    fingerprints: FingerprintPool,
    behavior: BehavioralEngine,
}

impl ResearchDriver {
    /// Create a new driver connected to a running WebDriver service
    /// (Chromedriver at `http://localhost:9515` by default).
    pub async fn connect(options: DriverOptions) -> Result<Self> {
        let fingerprints = FingerprintPool::new();
        let session_profile = fingerprints.rotate();
        let args = build_stealth_arguments(options.stealth, &session_profile, options.headless);
        let caps = chrome_capabilities(&args);

        tracing::info!(
            target: "browser.stealth",
            webdriver = %options.webdriver_url,
            headless = options.headless,
            stealth = ?options.stealth,
            "Starting browser session"
        );
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .with_context(|| format!("connecting to WebDriver at {}", options.webdriver_url))?;

        Ok(Self {
            client,
            options,
            fingerprints,
            behavior: BehavioralEngine::new(),
        })
    }

    /// Navigate to `url` under a freshly rotated fingerprint and return the
    /// loaded page with stealth scripts applied.
    pub async fn goto(&mut self, url: &Url) -> Result<ResearchPage> {
        let profile = self.fingerprints.rotate();
        self.apply_viewport(&profile).await;
        self.behavior.settle().await;

        tracing::debug!(target: "browser.nav", %url, ua = %profile.user_agent, "Navigating");
        self.client
            .goto(url.as_str())
            .await
            .with_context(|| format!("navigating to {url}"))?;
        self.client
            .wait()
            .at_most(self.options.body_wait)
            .for_element(Locator::Css("body"))
            .await
            .context("waiting for <body>")?;

        self.apply_stealth(&profile).await?;
        self.scroll_a_little().await;

        Ok(ResearchPage::new(self.client.clone()))
    }

    async fn apply_viewport(&self, profile: &FingerprintProfile) {
        let (w, h) = profile.viewport;
        if let Err(err) = self.client.set_window_size(w, h).await {
            tracing::debug!(target: "browser.stealth", error = %err, "Window resize rejected");
        }
    }

    async fn apply_stealth(&self, profile: &FingerprintProfile) -> Result<()> {
        for script in StealthScripts::for_level(self.options.stealth, profile) {
            self.client
                .execute(&script, vec![])
                .await
                .context("applying stealth script")?;
        }
        Ok(())
    }

    // Scroll failures are cosmetic.
    async fn scroll_a_little(&self) {
        let script = self.behavior.scroll_script();
        if let Err(err) = self.client.execute(&script, vec![]).await {
            tracing::debug!(target: "browser.stealth", error = %err, "Scroll jitter failed");
            return;
        }
        self.behavior.random_delay(150, 450).await;
    }

    /// Close the underlying browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await.context("closing browser session")?;
        tracing::info!(target: "browser.nav", "Browser session closed");
        Ok(())
    }
}
