//! Writing finished runs to the output directory.
//!
//! A failed run never gets a report or script. When it carries lineage
//! (debug/validate), its per-source artifacts and a `failure.json` are
//! written so the failure can be inspected.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use researcher_common::model::ResearchReport;
use researcher_pipeline::{ComedyRun, ResearchRun, RunFailure, SourceOutcome, SourceTrace};

const MAX_SLUG_CHARS: usize = 50;

static SEPARATOR_RUNS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[\s_]+").ok());

/// Filename-safe form of `text`.
pub fn slug(text: &str) -> String {
    let mut cleaned: String = text
        .chars()
        .map(|c| match c {
            '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    if let Some(runs) = SEPARATOR_RUNS.as_ref() {
        cleaned = runs.replace_all(&cleaned, "_").into_owned();
    }
    let cleaned = cleaned.trim_matches('_');
    let slug: String = cleaned.chars().take(MAX_SLUG_CHARS).collect();
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create output directory: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a research run; returns its directory.
    pub fn write_research(&self, run: &ResearchRun) -> Result<PathBuf> {
        let report = &run.report;
        let dir = self.root.join(format!("research_{}", slug(&report.query.text)));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create run directory: {}", dir.display()))?;

        write(&dir.join("research_report.md"), render_report(report))?;
        write(&dir.join("research_log.md"), render_log(report, run.lineage.as_deref()))?;

        if let Some(lineage) = &run.lineage {
            write(&dir.join("lineage.json"), serde_json::to_string_pretty(lineage)?)?;
            for trace in lineage {
                write_source_artifacts(&dir, trace)?;
            }
        }

        tracing::info!(dir = %dir.display(), summaries = report.summaries.len(), "Research output written");
        Ok(dir)
    }

    /// Write a comedy run; returns the script path.
    pub fn write_comedy(&self, run: &ComedyRun) -> Result<PathBuf> {
        let script = self
            .root
            .join(format!("comedy_script_{}.md", run.date.format("%Y%m%d")));
        write(&script, render_comedy_script(run))?;
        write(
            &self.root.join("extracted_trends.json"),
            serde_json::to_string_pretty(&run.trends)?,
        )?;

        if let Some(lineage) = &run.lineage {
            let dir = self.root.join(format!("comedy_{}", run.date.format("%Y%m%d")));
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create lineage directory: {}", dir.display()))?;
            write(&dir.join("lineage.json"), serde_json::to_string_pretty(lineage)?)?;
            write(&dir.join("segments.json"), serde_json::to_string_pretty(&run.segments)?)?;
        }

        tracing::info!(script = %script.display(), "Comedy script written");
        Ok(script)
    }

    /// Write the lineage of a failed research run, if it kept any; returns
    /// its directory.
    pub fn write_failed_research(&self, query: &str, failure: &RunFailure) -> Result<Option<PathBuf>> {
        let Some(lineage) = &failure.lineage else {
            return Ok(None);
        };
        let dir = self.root.join(format!("research_{}", slug(query)));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create run directory: {}", dir.display()))?;

        write_failure(&dir, failure)?;
        write(&dir.join("lineage.json"), serde_json::to_string_pretty(lineage)?)?;
        for trace in lineage {
            write_source_artifacts(&dir, trace)?;
        }

        tracing::info!(dir = %dir.display(), traces = lineage.len(), "Failed run diagnostics written");
        Ok(Some(dir))
    }

    /// Write the lineage of a failed comedy run, if it kept any.
    pub fn write_failed_comedy(&self, date: NaiveDate, failure: &RunFailure) -> Result<Option<PathBuf>> {
        let Some(lineage) = &failure.lineage else {
            return Ok(None);
        };
        let dir = self.root.join(format!("comedy_{}", date.format("%Y%m%d")));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create lineage directory: {}", dir.display()))?;

        write_failure(&dir, failure)?;
        write(&dir.join("lineage.json"), serde_json::to_string_pretty(lineage)?)?;

        tracing::info!(dir = %dir.display(), traces = lineage.len(), "Failed run diagnostics written");
        Ok(Some(dir))
    }
}

fn write_failure(dir: &Path, failure: &RunFailure) -> Result<()> {
    let summary = serde_json::json!({
        "run_id": failure.run_id,
        "error": failure.error.to_string(),
        "states": failure.states,
    });
    write(&dir.join("failure.json"), serde_json::to_string_pretty(&summary)?)
}

fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn write_source_artifacts(dir: &Path, trace: &SourceTrace) -> Result<()> {
    let rank = trace.rank();
    if let Some(capture) = &trace.capture {
        write(&dir.join(format!("source_{rank}.html")), &capture.html)?;
        write(&dir.join(format!("source_{rank}.txt")), &capture.visible_text)?;
        if let Some(png) = &capture.screenshot_png {
            write(&dir.join(format!("source_{rank}.png")), png)?;
        }
    }
    if trace.extraction.is_some() {
        let extraction = serde_json::json!({
            "content": trace.extraction,
            "strategies": trace.strategies,
        });
        write(
            &dir.join(format!("extraction_{rank}.json")),
            serde_json::to_string_pretty(&extraction)?,
        )?;
    }
    Ok(())
}

pub fn render_report(report: &ResearchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Research Report: {}\n", report.query.text);
    let _ = writeln!(
        out,
        "Date: {}\n",
        report.metadata.finished_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "{}\n", report.final_synthesis_text.trim());
    let _ = writeln!(out, "## Sources\n");
    for (i, summary) in report.summaries.iter().enumerate() {
        let _ = writeln!(out, "{}. [{}]({})", i + 1, summary.title, summary.source_url);
    }
    out
}

pub fn render_log(report: &ResearchReport, lineage: Option<&[SourceTrace]>) -> String {
    let meta = &report.metadata;
    let mut out = String::new();
    let _ = writeln!(out, "# Research Log: {}\n", report.query.text);
    let _ = writeln!(out, "- Run: {}", meta.run_id);
    let _ = writeln!(out, "- Started: {}", meta.started_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "- Basic model: {}", meta.basic_model);
    let _ = writeln!(out, "- Reasoning model: {}\n", meta.reasoning_model);

    let _ = writeln!(out, "## Web Search\n");
    let _ = writeln!(out, "- Query: {}", report.query.text);
    let _ = writeln!(out, "- Candidates: {}", meta.candidates);
    let _ = writeln!(out, "- Summarized: {}", meta.summarized);
    let _ = writeln!(out, "- Skipped: {}\n", meta.skipped.len());

    let _ = writeln!(out, "## Analyzed Articles\n");
    match lineage {
        Some(traces) => {
            for trace in traces {
                let _ = writeln!(out, "### Article {}: {}", trace.rank(), trace.result.title);
                let _ = writeln!(out, "- URL: {}", trace.result.url);
                if let Some(content) = &trace.extraction {
                    let _ = writeln!(
                        out,
                        "- Extracted {} characters via {:?}",
                        content.cleaned_text.chars().count(),
                        content.method
                    );
                }
                match &trace.outcome {
                    SourceOutcome::Summarized(_) => {
                        let _ = writeln!(out, "- Status: summarized\n");
                    }
                    SourceOutcome::Skipped(s) => {
                        let _ = writeln!(
                            out,
                            "- Status: skipped while {:?} ({}): {}\n",
                            s.stage, s.reason, s.detail
                        );
                    }
                }
            }
        }
        None => {
            for summary in &report.summaries {
                let _ = writeln!(out, "### Article {}: {}", summary.rank, summary.title);
                let _ = writeln!(out, "- URL: {}", summary.source_url);
                let _ = writeln!(out, "- Status: summarized\n");
            }
            for s in &meta.skipped {
                let _ = writeln!(out, "### Article {}: {}", s.rank, s.url);
                let _ = writeln!(
                    out,
                    "- Status: skipped while {:?} ({}): {}\n",
                    s.stage, s.reason, s.detail
                );
            }
        }
    }

    for summary in &report.summaries {
        let _ = writeln!(out, "### Summary for {}", summary.title);
        if let Some(tokens) = summary.tokens_used {
            let ms = summary.generation_ms.unwrap_or_default();
            let _ = writeln!(out, "*{}: {tokens} tokens in {ms} ms*", summary.model_used);
        }
        let _ = writeln!(out, "{}\n", summary.summary_text.trim());
    }

    let _ = writeln!(out, "## Sources Used\n");
    for (i, summary) in report.summaries.iter().enumerate() {
        let _ = writeln!(out, "{}. [{}]({})", i + 1, summary.title, summary.source_url);
    }
    let _ = writeln!(out, "\n## Research Completed\n");
    let _ = writeln!(
        out,
        "Research completed at: {}",
        meta.finished_at.format("%Y-%m-%d %H:%M:%S")
    );
    out
}

pub fn render_comedy_script(run: &ComedyRun) -> String {
    let today = run.date.format("%A, %B %d, %Y");
    let mut out = String::new();
    let _ = writeln!(out, "# Tonight's Trending Topics - {today}\n");
    let _ = writeln!(
        out,
        "Welcome to Tonight's Trends for {today}! We've got some wild searches happening today, folks. Let's dive in!\n"
    );
    for segment in &run.segments {
        let Some(bit) = &segment.bit else {
            continue;
        };
        let _ = writeln!(
            out,
            "## Trending at #{}: {}",
            segment.trend.rank, segment.trend.title
        );
        let _ = writeln!(out, "*Search volume: {}*\n", segment.trend.volume);
        let _ = writeln!(out, "{}\n", bit.trim());
    }
    if let Some(facts) = &run.daily_facts {
        let _ = writeln!(out, "## Today's Fascinating Facts\n\n{}\n", facts.trim());
    }
    out
}
