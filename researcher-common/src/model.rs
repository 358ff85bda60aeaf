//! Per-run research artifacts.
//!
//! Each run produces a strict lineage: one [`SearchResult`] feeds one
//! [`PageCapture`], which feeds one [`ExtractedContent`], which feeds at most
//! one [`SourceSummary`]. Nothing here is mutated after construction; a stage
//! that fails produces a failed artifact instead of being left out.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::FailureKind;

/// Which workflow a query drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchMode {
    Research,
    Comedy,
}

/// Immutable run input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub text: String,
    pub mode: ResearchMode,
    pub article_limit: usize,
}

impl ResearchQuery {
    pub fn research(text: impl Into<String>, article_limit: usize) -> Self {
        Self {
            text: text.into(),
            mode: ResearchMode::Research,
            article_limit,
        }
    }
}

/// A candidate source as returned by the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: Url,
    pub title: String,
    pub snippet: String,
    /// 1-based position in the engine's display order after filtering.
    pub rank: usize,
}

/// Raw page state captured by the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCapture {
    pub url: Url,
    pub title: Option<String>,
    pub html: String,
    /// `document.body.innerText` as rendered by the browser.
    pub visible_text: String,
    #[serde(skip)]
    pub screenshot_png: Option<Vec<u8>>,
    pub fetched_at: DateTime<Utc>,
    pub success: bool,
    pub attempts: u32,
    pub failure: Option<String>,
}

impl PageCapture {
    /// A capture for a URL that never loaded; the body is empty.
    pub fn failed(url: Url, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            url,
            title: None,
            html: String::new(),
            visible_text: String::new(),
            screenshot_png: None,
            fetched_at: Utc::now(),
            success: false,
            attempts,
            failure: Some(reason.into()),
        }
    }
}

/// Extraction strategies in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Main-content selection via well-known article containers.
    StructuredSelector,
    /// The element holding the most paragraph text.
    LargestTextBlock,
    /// Everything visible on the page.
    RawVisibleText,
}

impl ExtractionMethod {
    pub const PRIORITY: [ExtractionMethod; 3] = [
        ExtractionMethod::StructuredSelector,
        ExtractionMethod::LargestTextBlock,
        ExtractionMethod::RawVisibleText,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Sufficient,
    Insufficient,
}

/// Cleaned article text derived from a single [`PageCapture`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub source_url: Url,
    pub title: Option<String>,
    pub cleaned_text: String,
    /// The first strategy whose output met the threshold, or the last one
    /// tried when none did.
    pub method: ExtractionMethod,
    pub status: ValidationStatus,
    /// blake3 hex digest of `cleaned_text`.
    pub checksum: String,
}

impl ExtractedContent {
    pub fn is_usable(&self) -> bool {
        self.status == ValidationStatus::Sufficient
    }
}

/// Model class used for a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Fast model for per-source work.
    Basic,
    /// Slower model for synthesis and generation.
    Reasoning,
}

/// One source condensed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub rank: usize,
    pub source_url: Url,
    pub title: String,
    pub summary_text: String,
    pub model_used: String,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    #[serde(default)]
    pub generation_ms: Option<u64>,
}

/// Per-source pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStage {
    Fetching,
    Extracting,
    Summarizing,
}

/// Coordinator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Searching,
    Fetching,
    Extracting,
    Summarizing,
    Synthesizing,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub rank: usize,
    pub url: Url,
    pub stage: SourceStage,
    pub reason: FailureKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub basic_model: String,
    pub reasoning_model: String,
    /// Model that wrote `final_synthesis_text`.
    pub synthesis_model: String,
    pub candidates: usize,
    pub summarized: usize,
    pub skipped: Vec<SkippedSource>,
    pub states: Vec<RunState>,
}

/// Terminal artifact of a research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub query: ResearchQuery,
    /// Successful summaries in search-rank order.
    pub summaries: Vec<SourceSummary>,
    pub final_synthesis_text: String,
    pub metadata: GenerationMetadata,
}

impl ResearchReport {
    pub fn skipped_count(&self) -> usize {
        self.metadata.skipped.len()
    }
}
