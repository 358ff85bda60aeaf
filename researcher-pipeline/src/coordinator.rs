use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use researcher_common::model::{
    GenerationMetadata, ModelTier, ResearchQuery, ResearchReport, RunState, SearchResult,
    SkippedSource, SourceStage, SourceSummary,
};
use researcher_common::{ResearchError, Result};
use researcher_web::browser::PageLoader;
use researcher_web::search::SearchOrchestrator;
use uuid::Uuid;

use crate::context::ResearchContext;
use crate::lineage::{SourceOutcome, SourceTrace};

/// A finished research run.
#[derive(Debug, Clone)]
pub struct ResearchRun {
    pub report: ResearchReport,
    /// One trace per candidate in rank order; only for debug/validate runs.
    pub lineage: Option<Vec<SourceTrace>>,
}

/// A run that ended in a run-level error, with what it gathered first.
#[derive(Debug, thiserror::Error)]
#[error("run {run_id} failed: {error}")]
pub struct RunFailure {
    pub error: ResearchError,
    pub run_id: Uuid,
    pub states: Vec<RunState>,
    /// Traces of every candidate processed before the failure; only for
    /// debug/validate runs.
    pub lineage: Option<Vec<SourceTrace>>,
}

pub type RunResult<T> = std::result::Result<T, RunFailure>;

/// Drives the stages of one run over a borrowed [`ResearchContext`].
pub struct Coordinator<'c, L: PageLoader> {
    pub(crate) ctx: &'c mut ResearchContext<L>,
    pub(crate) run_id: Uuid,
    states: Vec<RunState>,
}

impl<'c, L: PageLoader> Coordinator<'c, L> {
    pub fn new(ctx: &'c mut ResearchContext<L>) -> Self {
        Self {
            ctx,
            run_id: Uuid::new_v4(),
            states: vec![RunState::Init],
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn states(&self) -> &[RunState] {
        &self.states
    }

    pub(crate) fn enter(&mut self, state: RunState) {
        tracing::debug!(target: "pipeline.run", run_id = %self.run_id, ?state, "State transition");
        self.states.push(state);
    }

    /// Search → per-source processing → synthesis.
    pub async fn research(mut self, query: &ResearchQuery) -> RunResult<ResearchRun> {
        let started_at = Utc::now();
        tracing::info!(
            target: "pipeline.run",
            run_id = %self.run_id,
            query = %query.text,
            article_limit = query.article_limit,
            "Research run started"
        );

        let search = self.ctx.search.clone();
        let candidates = match self.discover(&search, &query.text, query.article_limit).await {
            Ok(candidates) => candidates,
            Err(err) => return Err(self.fail(err, Vec::new())),
        };
        if candidates.is_empty() {
            tracing::warn!(target: "pipeline.run", run_id = %self.run_id, query = %query.text, "Search returned no candidates");
            return Err(self.fail(ResearchError::NoUsableSources { skipped: 0 }, Vec::new()));
        }
        let candidate_count = candidates.len();

        let mut traces = Vec::with_capacity(candidate_count);
        for result in candidates {
            traces.push(self.process_source(&query.text, result).await);
        }

        let summaries: Vec<SourceSummary> = traces
            .iter()
            .filter_map(|t| t.outcome.summary().cloned())
            .collect();
        let skipped: Vec<SkippedSource> = traces
            .iter()
            .filter_map(|t| t.outcome.skipped().cloned())
            .collect();

        if summaries.is_empty() {
            let err = ResearchError::NoUsableSources {
                skipped: skipped.len(),
            };
            return Err(self.fail(err, traces));
        }

        self.enter(RunState::Synthesizing);
        let llm = &self.ctx.llm;
        let topic = query.text.as_str();
        let summaries_ref = summaries.as_slice();
        let synthesis = call_model(
            self.ctx.settings.llm_timeout,
            self.ctx.settings.model_attempts,
            "synthesize",
            move || llm.synthesize(topic, summaries_ref, ModelTier::Reasoning),
        )
        .await;
        let final_synthesis_text = match synthesis {
            Ok(text) => text,
            Err(err) => {
                let err = ResearchError::SynthesisFailed(Box::new(err));
                return Err(self.fail(err, traces));
            }
        };
        self.enter(RunState::Done);

        tracing::info!(
            target: "pipeline.run",
            run_id = %self.run_id,
            summarized = summaries.len(),
            skipped = skipped.len(),
            "Research run finished"
        );

        let metadata = GenerationMetadata {
            run_id: self.run_id,
            started_at,
            finished_at: Utc::now(),
            basic_model: self.ctx.llm.model_name(ModelTier::Basic).to_string(),
            reasoning_model: self.ctx.llm.model_name(ModelTier::Reasoning).to_string(),
            synthesis_model: self.ctx.llm.model_name(ModelTier::Reasoning).to_string(),
            candidates: candidate_count,
            summarized: summaries.len(),
            skipped,
            states: self.states.clone(),
        };
        let lineage = self.ctx.settings.collect_lineage().then_some(traces);

        Ok(ResearchRun {
            report: ResearchReport {
                query: query.clone(),
                summaries,
                final_synthesis_text,
                metadata,
            },
            lineage,
        })
    }

    /// Collect up to `limit` candidates; search failures end the run.
    pub(crate) async fn discover(
        &mut self,
        search: &SearchOrchestrator,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        self.enter(RunState::Searching);
        let mut candidates = Vec::with_capacity(limit);
        let stream = search.search(&mut self.ctx.browser, query, limit);
        futures::pin_mut!(stream);
        while let Some(result) = stream.next().await {
            let result = result?;
            tracing::info!(
                target: "pipeline.run",
                run_id = %self.run_id,
                rank = result.rank,
                url = %result.url,
                "Candidate accepted"
            );
            candidates.push(result);
            if candidates.len() >= limit {
                break;
            }
        }
        Ok(candidates)
    }

    /// Fetch, extract and summarize one candidate. Never fails: errors
    /// become a skipped outcome recorded on the trace.
    pub(crate) async fn process_source(&mut self, topic: &str, result: SearchResult) -> SourceTrace {
        let run_id = self.run_id;
        let rank = result.rank;
        let keep_artifacts = self.ctx.settings.collect_lineage();

        self.enter(RunState::Fetching);
        let capture = self.ctx.browser.navigate(&result.url).await;
        if !capture.success {
            let err = ResearchError::NavigationFailure {
                url: result.url.to_string(),
                reason: capture.failure.clone().unwrap_or_default(),
            };
            let outcome = skip(run_id, &result, SourceStage::Fetching, &err);
            return SourceTrace {
                result,
                capture: keep_artifacts.then_some(capture),
                extraction: None,
                strategies: None,
                outcome,
            };
        }

        self.enter(RunState::Extracting);
        let extraction = self.ctx.extractor.extract(&capture);
        let capture = keep_artifacts.then_some(capture);
        let content = extraction.content;
        if !content.is_usable() {
            let err = ResearchError::ExtractionInsufficient {
                url: result.url.to_string(),
                chars: content.cleaned_text.chars().count(),
            };
            let outcome = skip(run_id, &result, SourceStage::Extracting, &err);
            return SourceTrace {
                result,
                capture,
                extraction: Some(content),
                strategies: extraction.trace,
                outcome,
            };
        }

        self.enter(RunState::Summarizing);
        let llm = &self.ctx.llm;
        let content_ref = &content;
        let summary = call_model(
            self.ctx.settings.llm_timeout,
            self.ctx.settings.model_attempts,
            "summarize",
            move || llm.summarize(content_ref, topic, rank, ModelTier::Basic),
        )
        .await;

        let outcome = match summary {
            Ok(summary) => {
                tracing::info!(
                    target: "pipeline.source",
                    %run_id,
                    rank,
                    url = %result.url,
                    method = ?content.method,
                    summary_chars = summary.summary_text.chars().count(),
                    "Source summarized"
                );
                SourceOutcome::Summarized(summary)
            }
            Err(err) => skip(run_id, &result, SourceStage::Summarizing, &err),
        };

        SourceTrace {
            result,
            capture,
            extraction: Some(content),
            strategies: extraction.trace,
            outcome,
        }
    }

    /// Enter `Failed`, keeping `traces` when lineage is collected.
    pub(crate) fn fail(&mut self, err: ResearchError, traces: Vec<SourceTrace>) -> RunFailure {
        self.enter(RunState::Failed);
        tracing::error!(
            target: "pipeline.run",
            run_id = %self.run_id,
            error = %err,
            traced = traces.len(),
            "Run failed"
        );
        RunFailure {
            error: err,
            run_id: self.run_id,
            states: self.states.clone(),
            lineage: self.ctx.settings.collect_lineage().then_some(traces),
        }
    }
}

fn skip(run_id: Uuid, result: &SearchResult, stage: SourceStage, err: &ResearchError) -> SourceOutcome {
    let reason = err.failure_kind(stage);
    tracing::warn!(
        target: "pipeline.source",
        %run_id,
        rank = result.rank,
        url = %result.url,
        ?stage,
        %reason,
        error = %err,
        "Source skipped"
    );
    SourceOutcome::Skipped(SkippedSource {
        rank: result.rank,
        url: result.url.clone(),
        stage,
        reason,
        detail: err.to_string(),
    })
}

/// Whether a failed model call is worth repeating with identical input.
fn is_retryable(err: &ResearchError) -> bool {
    matches!(
        err,
        ResearchError::ModelUnavailable(_)
            | ResearchError::ModelOutputInvalid(_)
            | ResearchError::Timeout
    )
}

/// Run a model call under `timeout`, repeating retryable failures until
/// `attempts` calls have been made.
pub(crate) async fn call_model<T, F, Fut>(
    timeout: Duration,
    attempts: u32,
    what: &'static str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match tokio::time::timeout(timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => ResearchError::Timeout,
        };
        if attempt >= attempts || !is_retryable(&err) {
            return Err(err);
        }
        tracing::warn!(target: "pipeline.run", call = what, attempt, error = %err, "Model call failed; retrying");
        attempt += 1;
    }
}
