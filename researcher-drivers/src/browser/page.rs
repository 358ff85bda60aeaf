use anyhow::{Context, Result};
use fantoccini::Client;
use serde_json::Value;

const VISIBLE_TEXT_SCRIPT: &str =
    "return document.body ? document.body.innerText : document.documentElement.innerText;";

/// Everything read from a loaded page.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub title: Option<String>,
    pub html: String,
    pub visible_text: String,
    pub screenshot_png: Option<Vec<u8>>,
}

/// Read-only view of the page currently loaded in a driver session.
pub struct ResearchPage {
    pub(crate) client: Client,
}

impl ResearchPage {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Return the full page HTML source.
    pub async fn content(&self) -> Result<String> {
        self.client.source().await.context("reading page source")
    }

    /// Return the page title, `None` when blank.
    pub async fn title(&self) -> Result<Option<String>> {
        let title = self.client.title().await.context("reading page title")?;
        let title = title.trim();
        Ok((!title.is_empty()).then(|| title.to_string()))
    }

    /// `innerText` of the body as rendered.
    pub async fn visible_text(&self) -> Result<String> {
        let value = self
            .client
            .execute(VISIBLE_TEXT_SCRIPT, vec![])
            .await
            .context("reading visible text")?;
        Ok(match value {
            Value::String(text) => text,
            _ => String::new(),
        })
    }

    /// PNG screenshot of the viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client.screenshot().await.context("taking screenshot")
    }

    /// Title, HTML and visible text; the screenshot is best effort.
    pub async fn snapshot(&self, with_screenshot: bool) -> Result<PageSnapshot> {
        let title = self.title().await?;
        let html = self.content().await?;
        let visible_text = self.visible_text().await?;
        let screenshot_png = if with_screenshot {
            match self.screenshot().await {
                Ok(png) => Some(png),
                Err(err) => {
                    tracing::warn!(target: "browser.nav", error = %err, "Screenshot failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(PageSnapshot {
            title,
            html,
            visible_text,
            screenshot_png,
        })
    }
}
