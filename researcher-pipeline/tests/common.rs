#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use researcher_common::observability::{LogConfig, LogFormat};
use researcher_common::{ResearchError, Result};
use researcher_drivers::PageSnapshot;
use researcher_llm::research::ResearchLlm;
use researcher_llm::traits::{LlmClient, LlmResponse};
use researcher_pipeline::{PipelineSettings, ResearchContext};
use researcher_web::browser::{BrowserController, PageLoader, RetryPolicy};
use researcher_web::extract::Extractor;
use researcher_web::search::SearchOrchestrator;
use url::Url;

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "researcher-tests",
            log_dir: Some(std::env::temp_dir().join("researcher-tests")),
            emit_stderr: true,
            format: LogFormat::Text,
            default_filter: "debug",
        };
        researcher_common::observability::init_logging(config).unwrap_or_default()
    });
}

/// What the fake web serves for one article URL.
#[derive(Clone)]
pub enum Page {
    Article(String),
    Thin,
    Refused,
    Hang,
}

/// An in-memory web: DuckDuckGo result pages keyed by query, articles keyed
/// by URL, and an optional trends page.
#[derive(Default)]
pub struct FakeWeb {
    results: HashMap<String, Vec<String>>,
    articles: HashMap<String, Page>,
    trends_text: Option<String>,
    search_down: bool,
    pub loads: Arc<Mutex<Vec<Url>>>,
    pub released: Arc<AtomicBool>,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    /// One result page for `query` listing `urls` in order.
    pub fn results(mut self, query: &str, urls: &[&str]) -> Self {
        let body: String = urls
            .iter()
            .map(|u| {
                format!(
                    r#"<div class="result"><a class="result__a" href="{u}">Story at {u}</a><a class="result__snippet">snippet</a></div>"#
                )
            })
            .collect();
        self.results
            .entry(query.to_string())
            .or_default()
            .push(format!("<html><body>{body}</body></html>"));
        self
    }

    pub fn page(mut self, url: &str, page: Page) -> Self {
        self.articles.insert(url.to_string(), page);
        self
    }

    pub fn trends_page(mut self, text: &str) -> Self {
        self.trends_text = Some(text.to_string());
        self
    }

    pub fn search_down(mut self) -> Self {
        self.search_down = true;
        self
    }
}

pub fn article_text(topic: &str) -> String {
    format!(
        "{topic} is covered in depth here. The article walks through the background, \
         the people involved, what changed this week and why observers expect further \
         developments over the coming months. Several analysts are quoted at length."
    )
}

fn snapshot(html: String, text: String) -> PageSnapshot {
    PageSnapshot {
        title: Some("Fake page".into()),
        html,
        visible_text: text,
        screenshot_png: None,
    }
}

#[async_trait]
impl PageLoader for FakeWeb {
    async fn load(&mut self, url: &Url) -> anyhow::Result<PageSnapshot> {
        self.loads.lock().unwrap().push(url.clone());

        match url.host_str() {
            Some("html.duckduckgo.com") => {
                if self.search_down {
                    anyhow::bail!("connection refused");
                }
                let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
                let query = pairs.get("q").cloned().unwrap_or_default();
                let index = pairs
                    .get("s")
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(0)
                    / 30;
                let html = self
                    .results
                    .get(&query)
                    .and_then(|pages| pages.get(index))
                    .cloned()
                    .unwrap_or_else(|| "<html><body>No results.</body></html>".into());
                Ok(snapshot(html, String::new()))
            }
            Some("trends.google.com") => match &self.trends_text {
                Some(text) => Ok(snapshot(format!("<html><body>{text}</body></html>"), text.clone())),
                None => anyhow::bail!("trends unavailable"),
            },
            _ => match self.articles.get(url.as_str()).cloned() {
                Some(Page::Article(text)) => Ok(snapshot(
                    format!("<html><body><nav>Home</nav><article><p>{text}</p></article></body></html>"),
                    format!("Home\n{text}"),
                )),
                Some(Page::Thin) => Ok(snapshot(
                    "<html><body><p>Subscribe to continue.</p></body></html>".into(),
                    "Subscribe to continue.".into(),
                )),
                Some(Page::Refused) | None => anyhow::bail!("net::ERR_CONNECTION_REFUSED"),
                Some(Page::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    anyhow::bail!("hung page finished")
                }
            },
        }
    }

    async fn release(&mut self) -> anyhow::Result<()> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A model that answers by prompt kind and counts its calls.
pub struct ScriptedLlm {
    name: String,
    pub calls: AtomicU32,
    transient_failures: AtomicU32,
    poison: Option<&'static str>,
    trends_json: String,
}

impl ScriptedLlm {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            transient_failures: AtomicU32::new(0),
            poison: None,
            trends_json: "[]".into(),
        }
    }

    /// Fail the next `n` calls with `ModelUnavailable`.
    pub fn failing_first(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Answer empty whenever the prompt contains `marker`.
    pub fn poisoned_by(mut self, marker: &'static str) -> Self {
        self.poison = Some(marker);
        self
    }

    pub fn with_trends(mut self, titles: &[&str]) -> Self {
        let entries: Vec<String> = titles
            .iter()
            .enumerate()
            .map(|(i, t)| format!(r#"{{"rank": {}, "title": "{t}", "volume": "100K+ searches"}}"#, i + 1))
            .collect();
        self.trends_json = format!("[{}]", entries.join(", "));
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: Option<u32>,
        _temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let pending = self.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(ResearchError::ModelUnavailable("connection reset".into()));
        }

        let text = if self.poison.is_some_and(|m| prompt.contains(m)) {
            "<think>nothing useful</think>".to_string()
        } else if prompt.contains("Google Trends") {
            self.trends_json.clone()
        } else if prompt.contains("Summarize the following article") {
            format!("Summary {n} from {}", self.name)
        } else if prompt.contains("comprehensive research report") {
            "# Report\n\nSources agree [Source 1].".to_string()
        } else if prompt.contains("late-night") {
            "And that's why the eclipse asked for a raise.".to_string()
        } else {
            "1. Something happened on this day.".to_string()
        };

        Ok(LlmResponse {
            text,
            model: Some(self.name.clone()),
            tokens_used: None,
            duration_ms: None,
        })
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

pub struct Harness {
    pub basic: Arc<ScriptedLlm>,
    pub reasoning: Arc<ScriptedLlm>,
    pub loads: Arc<Mutex<Vec<Url>>>,
    pub released: Arc<AtomicBool>,
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        llm_timeout: Duration::from_secs(30),
        model_attempts: 2,
        debug: false,
        validate: false,
        trend_region: "US".into(),
        trend_topics: 2,
        articles_per_trend: 2,
    }
}

pub fn context(
    web: FakeWeb,
    basic: ScriptedLlm,
    reasoning: ScriptedLlm,
    settings: PipelineSettings,
) -> (ResearchContext<FakeWeb>, Harness) {
    let harness = Harness {
        basic: Arc::new(basic),
        reasoning: Arc::new(reasoning),
        loads: Arc::clone(&web.loads),
        released: Arc::clone(&web.released),
    };
    let basic_client: Arc<dyn LlmClient> = harness.basic.clone();
    let reasoning_client: Arc<dyn LlmClient> = harness.reasoning.clone();
    let browser = BrowserController::with_loader(
        web,
        RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(200),
        },
        Duration::from_secs(10),
    );
    let ctx = ResearchContext::new(
        browser,
        ResearchLlm::new(basic_client, reasoning_client),
        SearchOrchestrator::new(vec!["facebook.com".into()]),
        Extractor::new(200, settings.validate),
        settings,
    );
    (ctx, harness)
}
