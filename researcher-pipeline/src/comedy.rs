//! Trending topics to a late-night script.
//!
//! Trends come from the trends page via the basic tier; when fewer than
//! [`MIN_EXTRACTED_TRENDS`] survive, a fixed list stands in. Each of the top
//! trends gets its own news search and per-source pass, and the reasoning
//! tier turns the summaries into a bit.

use chrono::NaiveDate;
use researcher_common::model::{ModelTier, RunState, SkippedSource, SourceSummary};
use researcher_common::ResearchError;
use researcher_llm::trends::{Trend, UNKNOWN_VOLUME};
use researcher_web::browser::PageLoader;
use researcher_web::search::SearchFlavor;
use researcher_web::trends::fetch_trending_page;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::{Coordinator, RunResult, call_model};
use crate::lineage::SourceTrace;

/// Extractions with fewer trends than this are replaced by the fallback list.
pub const MIN_EXTRACTED_TRENDS: usize = 5;

const FALLBACK_TRENDS: [&str; 10] = [
    "Ukraine Russia conflict",
    "Presidential election polls",
    "NFL scores",
    "Taylor Swift concert tickets",
    "Stock market today",
    "COVID variant symptoms",
    "Hurricane forecast",
    "iPhone 16 release date",
    "Gas prices",
    "Netflix new shows",
];

/// The stand-in list used when trend extraction comes up short.
pub fn fallback_trends() -> Vec<Trend> {
    FALLBACK_TRENDS
        .iter()
        .enumerate()
        .map(|(i, title)| Trend::new(i + 1, *title, UNKNOWN_VOLUME))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComedySegment {
    pub trend: Trend,
    /// Absent when the trend was skipped.
    pub bit: Option<String>,
    pub summaries: Vec<SourceSummary>,
    pub skipped_sources: Vec<SkippedSource>,
    /// Why no bit was written.
    pub skip_reason: Option<String>,
}

impl ComedySegment {
    pub fn is_skipped(&self) -> bool {
        self.bit.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ComedyRun {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub trends: Vec<Trend>,
    pub used_fallback_trends: bool,
    pub segments: Vec<ComedySegment>,
    pub daily_facts: Option<String>,
    pub states: Vec<RunState>,
    pub lineage: Option<Vec<SourceTrace>>,
}

impl<'c, L: PageLoader> Coordinator<'c, L> {
    /// Trends → per-trend research → bits, plus today's facts.
    pub async fn comedy(mut self, today: NaiveDate) -> RunResult<ComedyRun> {
        tracing::info!(target: "pipeline.run", run_id = %self.run_id, %today, "Comedy run started");

        let (trends, used_fallback_trends) = self.trending_topics().await;
        let keep_lineage = self.ctx.settings.collect_lineage();
        let mut lineage = Vec::new();
        let mut segments = Vec::new();

        let top = self.ctx.settings.trend_topics;
        for trend in trends.iter().take(top) {
            let (segment, traces) = self.trend_segment(trend).await;
            if keep_lineage {
                lineage.extend(traces);
            }
            segments.push(segment);
        }

        if segments.iter().all(ComedySegment::is_skipped) {
            let err = ResearchError::NoUsableSources {
                skipped: segments.len(),
            };
            return Err(self.fail(err, lineage));
        }

        let llm = &self.ctx.llm;
        let daily_facts = match call_model(
            self.ctx.settings.llm_timeout,
            self.ctx.settings.model_attempts,
            "daily_facts",
            move || llm.daily_facts(today, ModelTier::Reasoning),
        )
        .await
        {
            Ok(facts) => Some(facts),
            Err(err) => {
                tracing::warn!(target: "pipeline.run", run_id = %self.run_id, error = %err, "Daily facts unavailable");
                None
            }
        };
        self.enter(RunState::Done);

        tracing::info!(
            target: "pipeline.run",
            run_id = %self.run_id,
            segments = segments.len(),
            skipped = segments.iter().filter(|s| s.is_skipped()).count(),
            "Comedy run finished"
        );

        Ok(ComedyRun {
            run_id: self.run_id,
            date: today,
            trends,
            used_fallback_trends,
            segments,
            daily_facts,
            states: self.states().to_vec(),
            lineage: keep_lineage.then_some(lineage),
        })
    }

    /// Extracted trends, or the fallback list with `true`.
    async fn trending_topics(&mut self) -> (Vec<Trend>, bool) {
        self.enter(RunState::Searching);
        let region = self.ctx.settings.trend_region.clone();

        let page = match fetch_trending_page(&mut self.ctx.browser, &region).await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(target: "pipeline.run", run_id = %self.run_id, error = %err, "Trends page unavailable; using fallback trends");
                return (fallback_trends(), true);
            }
        };

        let llm = &self.ctx.llm;
        let text = page.visible_text.as_str();
        let extracted = call_model(
            self.ctx.settings.llm_timeout,
            self.ctx.settings.model_attempts,
            "extract_trends",
            move || llm.extract_trends(text, ModelTier::Basic),
        )
        .await;

        match extracted {
            Ok(trends) if trends.len() >= MIN_EXTRACTED_TRENDS => {
                tracing::info!(target: "pipeline.run", run_id = %self.run_id, count = trends.len(), "Trends extracted");
                (trends, false)
            }
            Ok(trends) => {
                tracing::warn!(target: "pipeline.run", run_id = %self.run_id, count = trends.len(), "Too few trends extracted; using fallback trends");
                (fallback_trends(), true)
            }
            Err(err) => {
                tracing::warn!(target: "pipeline.run", run_id = %self.run_id, error = %err, "Trend extraction failed; using fallback trends");
                (fallback_trends(), true)
            }
        }
    }

    async fn trend_segment(&mut self, trend: &Trend) -> (ComedySegment, Vec<SourceTrace>) {
        let skipped = |reason: String, traces: &[SourceTrace]| ComedySegment {
            trend: trend.clone(),
            bit: None,
            summaries: Vec::new(),
            skipped_sources: traces
                .iter()
                .filter_map(|t| t.outcome.skipped().cloned())
                .collect(),
            skip_reason: Some(reason),
        };

        let search = self.ctx.search.clone().with_flavor(SearchFlavor::News);
        let limit = self.ctx.settings.articles_per_trend;
        let candidates = match self.discover(&search, &trend.title, limit).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::warn!(target: "pipeline.run", run_id = %self.run_id, trend = %trend.title, error = %err, "Trend search failed");
                return (skipped(err.to_string(), &[]), Vec::new());
            }
        };

        let mut traces = Vec::with_capacity(candidates.len());
        for result in candidates {
            traces.push(self.process_source(&trend.title, result).await);
        }
        let summaries: Vec<SourceSummary> = traces
            .iter()
            .filter_map(|t| t.outcome.summary().cloned())
            .collect();
        if summaries.is_empty() {
            let err = ResearchError::NoUsableSources {
                skipped: traces.len(),
            };
            tracing::warn!(target: "pipeline.run", run_id = %self.run_id, trend = %trend.title, error = %err, "Trend skipped");
            return (skipped(err.to_string(), &traces), traces);
        }

        self.enter(RunState::Synthesizing);
        let research = research_notes(&trend.title, &summaries);
        let llm = &self.ctx.llm;
        let (topic, notes) = (trend.title.as_str(), research.as_str());
        let bit = call_model(
            self.ctx.settings.llm_timeout,
            self.ctx.settings.model_attempts,
            "comedy_bit",
            move || llm.comedy_bit(topic, notes, ModelTier::Reasoning),
        )
        .await;

        match bit {
            Ok(bit) => {
                let segment = ComedySegment {
                    trend: trend.clone(),
                    bit: Some(bit),
                    summaries,
                    skipped_sources: traces
                        .iter()
                        .filter_map(|t| t.outcome.skipped().cloned())
                        .collect(),
                    skip_reason: None,
                };
                (segment, traces)
            }
            Err(err) => {
                tracing::warn!(target: "pipeline.run", run_id = %self.run_id, trend = %trend.title, error = %err, "Comedy bit failed");
                (skipped(err.to_string(), &traces), traces)
            }
        }
    }
}

/// Research text handed to the comedy prompt.
fn research_notes(trend: &str, summaries: &[SourceSummary]) -> String {
    let mut notes = format!("Trend: {trend}\n\n");
    for (i, summary) in summaries.iter().enumerate() {
        notes.push_str(&format!(
            "Article {}: {}\nSource: {}\nSummary: {}\n\n",
            i + 1,
            summary.title,
            summary.source_url,
            summary.summary_text
        ));
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_trends_are_ranked_with_unknown_volume() {
        let trends = fallback_trends();
        assert_eq!(trends.len(), 10);
        assert_eq!(trends[0], Trend::new(1, "Ukraine Russia conflict", "Unknown"));
        assert!(trends.iter().enumerate().all(|(i, t)| t.rank == i + 1));
    }

    #[test]
    fn research_notes_number_the_articles() {
        let summaries = vec![SourceSummary {
            rank: 3,
            source_url: url::Url::parse("https://example.org/x").unwrap(),
            title: "Eclipse tonight".into(),
            summary_text: "Visible across the US.".into(),
            model_used: "mistral".into(),
            tokens_used: None,
            generation_ms: None,
        }];
        let notes = research_notes("Solar eclipse", &summaries);
        assert!(notes.starts_with("Trend: Solar eclipse"));
        assert!(notes.contains("Article 1: Eclipse tonight\nSource: https://example.org/x"));
    }
}
