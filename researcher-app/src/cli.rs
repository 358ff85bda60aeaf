use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use researcher_config::ResearcherConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Search, read and summarize sources for a query.
    Research,
    /// Turn today's trending searches into a late-night script.
    Comedy,
}

#[derive(Parser, Debug)]
#[command(
    name = "deep-researcher",
    about = "Browser-driven web research summarized by local language models"
)]
pub struct Cli {
    #[arg(short, long, value_enum, default_value_t = Mode::Research)]
    pub mode: Mode,

    /// Research query (required in research mode).
    #[arg(short, long)]
    pub query: Option<String>,

    /// Number of sources to read.
    #[arg(short, long)]
    pub articles: Option<usize>,

    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Basic-tier model used for per-source summaries.
    #[arg(long, env = "OLLAMA_MODEL")]
    pub ollama_model: Option<String>,

    /// Reasoning-tier model used for synthesis and comedy.
    #[arg(long, env = "OLLAMA_REASONING_MODEL")]
    pub reasoning_model: Option<String>,

    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Verbose logging and per-source artifacts.
    #[arg(long)]
    pub debug: bool,

    /// Record every extraction strategy's output.
    #[arg(long)]
    pub validate: bool,

    #[arg(long)]
    pub headless: bool,

    /// YAML config file; skipped when absent.
    #[arg(long, default_value = "researcher.yaml")]
    pub config: PathBuf,
}

impl Cli {
    /// Overlay explicitly given flags on the loaded config.
    pub fn apply(&self, config: &mut ResearcherConfig) {
        if let Some(articles) = self.articles {
            config.research.article_limit = articles;
        }
        if let Some(url) = &self.ollama_url {
            config.llm.endpoint = url.clone();
        }
        if let Some(model) = &self.ollama_model {
            config.llm.basic_model = model.clone();
        }
        if let Some(model) = &self.reasoning_model {
            config.llm.reasoning_model = model.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.display().to_string();
        }
        config.output.debug |= self.debug;
        config.output.validate |= self.validate;
        config.browser.headless |= self.headless;
    }

    /// The query to research, if this mode needs one and it is present.
    pub fn research_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}
