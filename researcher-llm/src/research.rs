//! Research prompts over two model tiers.
//!
//! [`ResearchLlm`] owns one client per [`ModelTier`] and turns pipeline
//! artifacts into prompts. Every prompt is bounded to `max_prompt_chars` by
//! keeping the head of the text, and every answer is cleaned of `<think>`
//! blocks before use.

use std::borrow::Cow;
use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use researcher_common::model::{ExtractedContent, ModelTier, SourceSummary};
use researcher_common::{ResearchError, Result};

use crate::traits::{LlmClient, LlmResponse};
use crate::trends::{parse_trends, Trend};

pub const DEFAULT_MAX_PROMPT_CHARS: usize = 8000;

const TRUNCATION_MARKER: &str = "\n[...]";

const SUMMARY_SYSTEM: &str =
    "You are a precise summarizer who extracts the most relevant information.";
const SYNTHESIS_SYSTEM: &str =
    "You are a thorough researcher who creates balanced, comprehensive reports.";
const TRENDS_SYSTEM: &str =
    "You extract structured data from text. Respond with valid JSON only.";
const COMEDY_SYSTEM: &str = "You are a comedy writer for a late-night TV show.";
const FACTS_SYSTEM: &str = "You provide accurate historical facts about specific dates.";

static THINK_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?(</think>|$)").ok());

/// Two-tier prompt front end used by the pipeline.
#[derive(Clone)]
pub struct ResearchLlm {
    basic: Arc<dyn LlmClient>,
    reasoning: Arc<dyn LlmClient>,
    max_prompt_chars: usize,
}

impl std::fmt::Debug for ResearchLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchLlm")
            .field("basic", &self.basic.model_name())
            .field("reasoning", &self.reasoning.model_name())
            .field("max_prompt_chars", &self.max_prompt_chars)
            .finish()
    }
}

impl ResearchLlm {
    pub fn new(basic: Arc<dyn LlmClient>, reasoning: Arc<dyn LlmClient>) -> Self {
        Self {
            basic,
            reasoning,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_max_prompt_chars(mut self, max: usize) -> Self {
        self.max_prompt_chars = max.max(1);
        self
    }

    pub fn client(&self, tier: ModelTier) -> &dyn LlmClient {
        match tier {
            ModelTier::Basic => self.basic.as_ref(),
            ModelTier::Reasoning => self.reasoning.as_ref(),
        }
    }

    pub fn model_name(&self, tier: ModelTier) -> &str {
        self.client(tier).model_name()
    }

    async fn ask(
        &self,
        tier: ModelTier,
        prompt: &str,
        system: &str,
        max_tokens: Option<u32>,
        temperature: f32,
    ) -> Result<LlmResponse> {
        let client = self.client(tier);
        tracing::info!(
            target: "llm.research",
            ?tier,
            model = %client.model_name(),
            prompt_chars = prompt.chars().count(),
            "Querying model"
        );
        let response = client
            .generate(prompt, Some(system), max_tokens, Some(temperature))
            .await?;

        let text = strip_think(&response.text);
        if text.is_empty() {
            return Err(ResearchError::ModelOutputInvalid(format!(
                "{} returned an empty answer",
                client.model_name()
            )));
        }
        tracing::debug!(
            target: "llm.research",
            ?tier,
            tokens = ?response.tokens_used,
            duration_ms = ?response.duration_ms,
            "Model answered"
        );
        Ok(LlmResponse { text, ..response })
    }

    /// Condense one extracted source.
    ///
    /// Content that failed extraction is refused with
    /// [`ResearchError::ExtractionInsufficient`] instead of being sent.
    pub async fn summarize(
        &self,
        content: &ExtractedContent,
        topic: &str,
        rank: usize,
        tier: ModelTier,
    ) -> Result<SourceSummary> {
        if !content.is_usable() {
            return Err(ResearchError::ExtractionInsufficient {
                url: content.source_url.to_string(),
                chars: content.cleaned_text.chars().count(),
            });
        }

        let title = content.title.as_deref().unwrap_or("Untitled");
        let body = truncate_head(&content.cleaned_text, self.max_prompt_chars);
        let prompt = format!(
            "Summarize the following article about '{topic}' in a concise paragraph.\n\
             Focus on key facts, developments, and relevance.\n\
             Ignore any advertisements, navigation elements, or unrelated content.\n\n\
             ARTICLE TITLE: {title}\n\
             SOURCE URL: {url}\n\n\
             ARTICLE TEXT:\n{body}\n\n\
             SUMMARY:",
            url = content.source_url,
        );

        let answer = self.ask(tier, &prompt, SUMMARY_SYSTEM, None, 0.3).await?;
        Ok(SourceSummary {
            rank,
            source_url: content.source_url.clone(),
            title: title.to_string(),
            summary_text: answer.text,
            model_used: self.model_name(tier).to_string(),
            tokens_used: answer.tokens_used,
            generation_ms: answer.duration_ms,
        })
    }

    /// Write the final report from summaries given in rank order.
    pub async fn synthesize(
        &self,
        topic: &str,
        summaries: &[SourceSummary],
        tier: ModelTier,
    ) -> Result<String> {
        if summaries.is_empty() {
            return Err(ResearchError::NoUsableSources { skipped: 0 });
        }

        let sources = format_sources(summaries);
        let sources = truncate_head(&sources, self.max_prompt_chars);
        let prompt = format!(
            "Create a comprehensive research report about \"{topic}\" based on the following sources.\n\n\
             SOURCES:\n{sources}\n\n\
             Your report should:\n\
             1. Start with a brief introduction to the topic\n\
             2. Synthesize the main points from all sources\n\
             3. Note any contradictions or differing perspectives between sources\n\
             4. Include specific facts, figures, and quotes when relevant\n\
             5. End with a conclusion that summarizes key insights\n\n\
             FORMAT:\n\
             - Use clear headings for sections\n\
             - Organize information logically\n\
             - Cite sources as [Source N] using the numbers above\n\n\
             RESEARCH REPORT:"
        );

        let answer = self.ask(tier, &prompt, SYNTHESIS_SYSTEM, Some(3072), 0.5).await?;
        Ok(answer.text)
    }

    /// Pull trending searches out of a trends page's visible text.
    pub async fn extract_trends(&self, page_text: &str, tier: ModelTier) -> Result<Vec<Trend>> {
        let content = truncate_head(page_text, self.max_prompt_chars);
        let prompt = format!(
            "You are helping to extract trending topics from Google Trends page content.\n\
             Identify the top trending searches from the provided text.\n\
             For each trend, provide the search term and search volume if available.\n\n\
             Format your response as a JSON array of objects:\n\
             [{{\"rank\": 1, \"title\": \"Trending Topic Name\", \"volume\": \"200K+ searches\"}}]\n\
             Use \"Unknown\" when the volume is not shown.\n\n\
             Include only the JSON array, nothing else.\n\n\
             Here's the content:\n{content}"
        );

        let answer = self.ask(tier, &prompt, TRENDS_SYSTEM, None, 0.3).await?;
        let trends = parse_trends(&answer.text);
        tracing::info!(target: "llm.research", count = trends.len(), "Extracted trends");
        if trends.is_empty() {
            return Err(ResearchError::ModelOutputInvalid(
                "no trends could be parsed from the model answer".into(),
            ));
        }
        Ok(trends)
    }

    /// A short late-night bit about one trend.
    pub async fn comedy_bit(&self, topic: &str, research: &str, tier: ModelTier) -> Result<String> {
        let research = truncate_head(research, self.max_prompt_chars.min(2000));
        let prompt = format!(
            "You are a late-night comedy show writer. Create a brief, funny joke or monologue bit about this trending topic.\n\
             Be witty, topical, and slightly irreverent, like popular late-night hosts.\n\
             Keep it to 2-3 sentences maximum. Make it punchy and audience-ready.\n\n\
             Use the research information to make the joke current and reference specific details if possible.\n\n\
             Trending topic: {topic}\n\
             Research information: {research}\n\n\
             Your late-night joke:"
        );

        let answer = self.ask(tier, &prompt, COMEDY_SYSTEM, None, 0.8).await?;
        Ok(answer.text)
    }

    /// Three verifiable facts about `today`.
    pub async fn daily_facts(&self, today: NaiveDate, tier: ModelTier) -> Result<String> {
        let prompt = format!(
            "Generate 3 interesting and surprising facts about today ({}).\n\
             These should be real facts about historical events, celebrity birthdays, or unusual holidays.\n\
             Make them somewhat obscure but verifiable, and word them in an engaging way.",
            today.format("%B %d, %Y")
        );

        let answer = self.ask(tier, &prompt, FACTS_SYSTEM, None, 0.7).await?;
        Ok(answer.text)
    }
}

fn format_sources(summaries: &[SourceSummary]) -> String {
    summaries
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "SOURCE {}: {}\nURL: {}\nSUMMARY: {}\n",
                i + 1,
                s.title,
                s.source_url,
                s.summary_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep at most `max_chars` characters from the start of `text`.
///
/// ```
/// use researcher_llm::research::truncate_head;
///
/// assert_eq!(truncate_head("short", 10), "short");
/// assert!(truncate_head("abcdefghij", 4).starts_with("abcd"));
/// ```
pub fn truncate_head(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!("{}{}", &text[..cut], TRUNCATION_MARKER)),
    }
}

/// Drop `<think>...</think>` reasoning traces and surrounding whitespace.
pub fn strip_think(text: &str) -> String {
    let cleaned = match THINK_BLOCK.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_blocks_are_removed() {
        assert_eq!(strip_think("<think>hmm\nok</think>\n\nAnswer"), "Answer");
        assert_eq!(strip_think("Answer<think>unterminated"), "Answer");
        assert_eq!(strip_think("  plain  "), "plain");
        assert_eq!(strip_think("<think>only thoughts</think>"), "");
    }

    #[test]
    fn truncation_keeps_the_head_on_char_boundaries() {
        let text = "é".repeat(10);
        let cut = truncate_head(&text, 3);
        assert_eq!(cut, format!("ééé{TRUNCATION_MARKER}"));
        assert!(matches!(truncate_head(&text, 10), Cow::Borrowed(_)));
    }
}
