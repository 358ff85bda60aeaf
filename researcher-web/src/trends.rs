//! Trending-topics page acquisition.
//!
//! Only the capture lives here; turning page text into ranked trends is a
//! model task handled by `researcher_llm::trends`.

use researcher_common::model::PageCapture;
use researcher_common::{ResearchError, Result};
use url::Url;

use crate::browser::{BrowserController, PageLoader};

pub const GOOGLE_TRENDS_URL: &str = "https://trends.google.com/trends/trendingsearches/daily";

/// Daily trending searches URL for a two-letter region code.
pub fn trends_url(region: &str) -> Result<Url> {
    let region = region.trim();
    if region.is_empty() || !region.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ResearchError::Config(format!(
            "invalid trends region '{region}'"
        )));
    }
    Url::parse_with_params(GOOGLE_TRENDS_URL, &[("geo", region.to_ascii_uppercase())])
        .map_err(|e| ResearchError::Config(e.to_string()))
}

/// Load the trending-searches page for `region`.
pub async fn fetch_trending_page<L: PageLoader>(
    browser: &mut BrowserController<L>,
    region: &str,
) -> Result<PageCapture> {
    let url = trends_url(region)?;
    let capture = browser.navigate(&url).await;
    if !capture.success {
        return Err(ResearchError::NavigationFailure {
            url: url.to_string(),
            reason: capture.failure.unwrap_or_default(),
        });
    }
    tracing::info!(
        target: "web.trends",
        %region,
        text_len = capture.visible_text.len(),
        "Trending page captured"
    );
    Ok(capture)
}
