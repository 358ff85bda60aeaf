//! Parsing of model-extracted trending topics.
//!
//! The model is asked for a JSON array but small models frequently wrap it in
//! prose or a code fence, or ignore the format and answer with a numbered
//! list. [`parse_trends`] accepts all three.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum number of trends kept from one extraction.
pub const MAX_TRENDS: usize = 10;

pub const UNKNOWN_VOLUME: &str = "Unknown";

static JSON_ARRAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").ok());
static NUMBERED_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#?(\d+)[.:)]\s+(.+?)(?:\s+-\s+|:\s+|$)").ok());
static VOLUME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+[KkMm]?(?:\+|\s+)\s*(?:searches|views|results))").ok());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    #[serde(default)]
    pub rank: usize,
    pub title: String,
    #[serde(default = "unknown_volume", deserialize_with = "volume_from_any")]
    pub volume: String,
}

impl Trend {
    pub fn new(rank: usize, title: impl Into<String>, volume: impl Into<String>) -> Self {
        Self {
            rank,
            title: title.into(),
            volume: volume.into(),
        }
    }
}

fn unknown_volume() -> String {
    UNKNOWN_VOLUME.to_string()
}

// Models answer with "200K+ searches", 200000 or null.
fn volume_from_any<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(de)?;
    Ok(match raw {
        serde_json::Value::String(s) if !s.trim().is_empty() => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => unknown_volume(),
    })
}

/// Parse a model answer into at most [`MAX_TRENDS`] trends.
///
/// ```
/// use researcher_llm::trends::parse_trends;
///
/// let trends = parse_trends("1. Solar eclipse - 2M+ searches\n2. Playoffs");
/// assert_eq!(trends.len(), 2);
/// assert_eq!(trends[0].title, "Solar eclipse");
/// assert_eq!(trends[0].volume, "2M+ searches");
/// assert_eq!(trends[1].volume, "Unknown");
/// ```
pub fn parse_trends(text: &str) -> Vec<Trend> {
    let mut trends = parse_json_array(text).unwrap_or_else(|| parse_numbered_lines(text));
    trends.retain(|t| !t.title.trim().is_empty());
    trends.truncate(MAX_TRENDS);
    for (idx, trend) in trends.iter_mut().enumerate() {
        trend.title = trend.title.trim().to_string();
        if trend.rank == 0 {
            trend.rank = idx + 1;
        }
    }
    trends
}

fn parse_json_array(text: &str) -> Option<Vec<Trend>> {
    let candidate = JSON_ARRAY.as_ref()?.find(text)?.as_str();
    match serde_json::from_str::<Vec<Trend>>(candidate) {
        Ok(trends) => Some(trends),
        Err(err) => {
            tracing::debug!(target: "llm.research", error = %err, "Trend JSON did not parse; using line fallback");
            None
        }
    }
}

fn parse_numbered_lines(text: &str) -> Vec<Trend> {
    let (Some(re_numbered), Some(re_volume)) = (NUMBERED_LINE.as_ref(), VOLUME.as_ref()) else {
        return Vec::new();
    };
    let mut trends = Vec::new();
    let mut next_rank = 1;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let volume = re_volume
            .captures(line)
            .map(|c| c[1].to_string())
            .unwrap_or_else(unknown_volume);

        if let Some(caps) = re_numbered.captures(line) {
            let rank = caps[1].parse().unwrap_or(next_rank);
            let title = caps[2].trim_matches(|c: char| c == '*' || c.is_whitespace());
            trends.push(Trend::new(rank, title, volume));
            next_rank = rank + 1;
        } else if line.chars().count() > 5
            && !line.starts_with(['[', ']', '{', '}', '`'])
            && !["Summary", "Note:", "These are", "Here"]
                .iter()
                .any(|p| line.starts_with(p))
        {
            trends.push(Trend::new(next_rank, line, volume));
            next_rank += 1;
        }
    }

    trends
}
