use std::time::Duration;

use chrono::NaiveDate;
use researcher_common::Result;
use researcher_common::model::ResearchQuery;
use researcher_config::ResearcherConfig;
use researcher_llm::ollama::OllamaOptions;
use researcher_llm::research::ResearchLlm;
use researcher_llm::{TierModels, connect_tiers};
use researcher_web::browser::{
    BrowserController, BrowserSettings, FantocciniLoader, PageLoader, RetryPolicy,
};
use researcher_web::extract::Extractor;
use researcher_web::search::SearchOrchestrator;

use crate::comedy::ComedyRun;
use crate::coordinator::{Coordinator, ResearchRun, RunResult};

/// Model calls get one retry with identical input.
pub const MODEL_ATTEMPTS: u32 = 2;

/// Run-wide knobs that are not owned by a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Upper bound on one model call, including the retry's own call.
    pub llm_timeout: Duration,
    pub model_attempts: u32,
    pub debug: bool,
    pub validate: bool,
    pub trend_region: String,
    pub trend_topics: usize,
    pub articles_per_trend: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&ResearcherConfig::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &ResearcherConfig) -> Self {
        Self {
            llm_timeout: config.llm.request_timeout(),
            model_attempts: MODEL_ATTEMPTS,
            debug: config.output.debug,
            validate: config.output.validate,
            trend_region: config.research.trend_region.clone(),
            trend_topics: config.research.trend_topics,
            articles_per_trend: config.research.articles_per_trend,
        }
    }

    /// Whether intermediate artifacts are kept for the caller.
    pub fn collect_lineage(&self) -> bool {
        self.debug || self.validate
    }
}

/// Browser session settings for a config; screenshots only when lineage is kept.
pub fn browser_settings(config: &ResearcherConfig) -> BrowserSettings {
    BrowserSettings {
        webdriver_url: config.browser.webdriver_url.clone(),
        headless: config.browser.headless,
        stealth: config.browser.stealth,
        nav_timeout: config.browser.page_load_timeout(),
        retry: RetryPolicy {
            max_attempts: config.browser.max_attempts,
            backoff: config.browser.retry_backoff(),
        },
        screenshots: config.output.debug || config.output.validate,
    }
}

/// The shared resources of one run.
///
/// Acquired once before the first stage and released after the last; the
/// consuming entry points ([`ResearchContext::research`],
/// [`ResearchContext::comedy`]) release on every exit path.
pub struct ResearchContext<L: PageLoader> {
    pub browser: BrowserController<L>,
    pub llm: ResearchLlm,
    pub search: SearchOrchestrator,
    pub extractor: Extractor,
    pub settings: PipelineSettings,
}

impl ResearchContext<FantocciniLoader> {
    /// Probe the model endpoint, then open the browser session.
    pub async fn acquire(config: &ResearcherConfig) -> Result<Self> {
        let models = TierModels {
            endpoint: config.llm.endpoint.clone(),
            basic: config.llm.basic_model.clone(),
            reasoning: config.llm.reasoning_model.clone(),
        };
        let options = OllamaOptions {
            request_timeout: config.llm.request_timeout(),
            auto_pull: config.llm.auto_pull,
            api_key: config.llm.api_key.clone(),
        };
        let llm = connect_tiers(&models, &options)
            .await?
            .with_max_prompt_chars(config.llm.max_prompt_chars);

        let browser = BrowserController::open_session(&browser_settings(config)).await?;
        tracing::info!(
            target: "pipeline.run",
            basic = %models.basic,
            reasoning = %models.reasoning,
            webdriver = %config.browser.webdriver_url,
            "Run context acquired"
        );

        let settings = PipelineSettings::from_config(config);
        Ok(Self::new(
            browser,
            llm,
            SearchOrchestrator::new(config.browser.blocked_sites.clone()),
            Extractor::new(config.extraction.min_chars, settings.validate),
            settings,
        ))
    }
}

impl<L: PageLoader> ResearchContext<L> {
    pub fn new(
        browser: BrowserController<L>,
        llm: ResearchLlm,
        search: SearchOrchestrator,
        extractor: Extractor,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            browser,
            llm,
            search,
            extractor,
            settings,
        }
    }

    /// Close the browser session. Failures are logged, not returned.
    pub async fn release(self) {
        if let Err(err) = self.browser.close().await {
            tracing::warn!(target: "pipeline.run", error = %format!("{err:#}"), "Failed to close browser session");
        } else {
            tracing::debug!(target: "pipeline.run", "Run context released");
        }
    }

    /// Run one research query, then release the context.
    pub async fn research(mut self, query: &ResearchQuery) -> RunResult<ResearchRun> {
        let outcome = Coordinator::new(&mut self).research(query).await;
        self.release().await;
        outcome
    }

    /// Run the trending-topics comedy workflow for `today`, then release the context.
    pub async fn comedy(mut self, today: NaiveDate) -> RunResult<ComedyRun> {
        let outcome = Coordinator::new(&mut self).comedy(today).await;
        self.release().await;
        outcome
    }
}
