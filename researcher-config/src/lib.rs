//! Loader for researcher configuration with YAML + environment overlays.
//!
//! Sources are merged in the order they are added, with `RESEARCHER__*`
//! environment variables applied last (`RESEARCHER__LLM__BASIC_MODEL=phi3`
//! sets `llm.basic_model`). Every string value may reference the process
//! environment as `${VAR}`; references are expanded after merging, so a
//! value pulled from one variable may itself point at another. Any field
//! left unset falls back to its documented default.
use config::{Config, ConfigError, Environment, File, FileFormat};
use researcher_common::StealthLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

pub const ENV_PREFIX: &str = "RESEARCHER";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearcherConfig {
    pub llm: LlmSection,
    pub browser: BrowserSection,
    pub extraction: ExtractionSection,
    pub research: ResearchSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub endpoint: String,
    pub basic_model: String,
    pub reasoning_model: String,
    pub request_timeout_secs: u64,
    /// Pull missing models instead of failing at acquire time.
    pub auto_pull: bool,
    pub max_prompt_chars: usize,
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".into(),
            basic_model: "mistral".into(),
            reasoning_model: "deepseek-r1".into(),
            request_timeout_secs: 120,
            auto_pull: false,
            max_prompt_chars: 8000,
            api_key: None,
        }
    }
}

impl LlmSection {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub webdriver_url: String,
    pub headless: bool,
    pub stealth: StealthLevel,
    pub page_load_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Hosts (and their subdomains) never used as sources.
    pub blocked_sites: Vec<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".into(),
            headless: false,
            stealth: StealthLevel::Balanced,
            page_load_timeout_secs: 30,
            max_attempts: 3,
            retry_backoff_ms: 1500,
            blocked_sites: [
                "msn.com",
                "facebook.com",
                "sfgate.com",
                "nytimes.com",
                "medium.com",
                "wsj.com",
                "bloomberg.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl BrowserSection {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    pub min_chars: usize,
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self { min_chars: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    pub article_limit: usize,
    pub trend_region: String,
    pub trend_topics: usize,
    pub articles_per_trend: usize,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            article_limit: 3,
            trend_region: "US".into(),
            trend_topics: 5,
            articles_per_trend: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: String,
    pub debug: bool,
    pub validate: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: "output".into(),
            debug: false,
            validate: false,
        }
    }
}

impl ResearcherConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Message(msg.to_string()));
        if self.research.article_limit == 0 {
            return invalid("research.article_limit must be at least 1");
        }
        if self.research.trend_topics == 0 || self.research.articles_per_trend == 0 {
            return invalid("research.trend_topics and research.articles_per_trend must be at least 1");
        }
        if self.extraction.min_chars == 0 {
            return invalid("extraction.min_chars must be at least 1");
        }
        if self.browser.max_attempts == 0 {
            return invalid("browser.max_attempts must be at least 1");
        }
        if self.llm.basic_model.trim().is_empty() || self.llm.reasoning_model.trim().is_empty() {
            return invalid("llm.basic_model and llm.reasoning_model must be set");
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => break,
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder over the `config` crate (YAML files, inline YAML, env overrides).
pub struct ResearcherConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for ResearcherConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResearcherConfigLoader {
    /// An empty loader; loading it yields the defaults.
    ///
    /// ```
    /// use researcher_config::ResearcherConfigLoader;
    ///
    /// let config = ResearcherConfigLoader::new()
    ///     .with_yaml_str("research:\n  article_limit: 5")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.research.article_limit, 5);
    /// assert_eq!(config.llm.basic_model, "mistral");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; the format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is silently skipped when absent.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge all sources, overlay `RESEARCHER__*` variables and expand
    /// `${VAR}` references into a typed, validated config.
    pub fn load(self) -> Result<ResearcherConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("browser.blocked_sites"),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: ResearcherConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}
