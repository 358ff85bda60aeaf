use researcher_common::model::{
    ExtractedContent, PageCapture, SearchResult, SkippedSource, SourceSummary,
};
use researcher_web::extract::ExtractionTrace;
use serde::{Deserialize, Serialize};

/// How one candidate source ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SourceOutcome {
    Summarized(SourceSummary),
    Skipped(SkippedSource),
}

impl SourceOutcome {
    pub fn summary(&self) -> Option<&SourceSummary> {
        match self {
            SourceOutcome::Summarized(summary) => Some(summary),
            SourceOutcome::Skipped(_) => None,
        }
    }

    pub fn skipped(&self) -> Option<&SkippedSource> {
        match self {
            SourceOutcome::Skipped(skipped) => Some(skipped),
            SourceOutcome::Summarized(_) => None,
        }
    }
}

/// Every artifact produced for one search result.
///
/// Stages after a failure are `None`; the failed stage itself is kept (a
/// failed capture, an insufficient extraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTrace {
    pub result: SearchResult,
    pub capture: Option<PageCapture>,
    pub extraction: Option<ExtractedContent>,
    /// Per-strategy outputs, recorded in validation mode only.
    pub strategies: Option<ExtractionTrace>,
    pub outcome: SourceOutcome,
}

impl SourceTrace {
    pub fn rank(&self) -> usize {
        self.result.rank
    }
}
