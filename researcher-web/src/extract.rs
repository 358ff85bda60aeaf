//! Article text extraction from captured pages.
//!
//! Extraction is an ordered chain of pure strategies over a [`PageCapture`]:
//!
//! 1. [`structured_selector`]: well-known main-content containers
//! 2. [`largest_text_block`]: the element holding the most paragraph text
//! 3. [`raw_visible_text`]: the browser's `innerText`
//!
//! Each strategy sees the length threshold; the first output that reaches it
//! wins. Validation mode
//! additionally runs every strategy and records its output, without changing
//! which one wins.

use researcher_common::model::{
    ExtractedContent, ExtractionMethod, PageCapture, ValidationStatus,
};
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_MIN_CHARS: usize = 200;

/// Paragraphs shorter than this are ignored by the largest-block heuristic.
const MIN_PARAGRAPH_CHARS: usize = 40;

const CONTENT_SELECTORS: [&str; 9] = [
    "article",
    "main",
    "[role='main']",
    ".article-content",
    ".article-body",
    ".post-content",
    ".entry-content",
    ".story-body",
    ".content",
];

const SKIPPED_TAGS: [&str; 10] = [
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe", "svg",
];

const BLOCK_TAGS: [&str; 18] = [
    "p", "div", "section", "article", "main", "li", "ul", "ol", "br", "h1", "h2", "h3", "h4",
    "h5", "h6", "tr", "blockquote", "pre",
];

/// A strategy gets the capture and the threshold its output must reach.
pub type Strategy = fn(&PageCapture, usize) -> Option<String>;

/// The strategy chain in priority order.
pub const STRATEGIES: [(ExtractionMethod, Strategy); 3] = [
    (ExtractionMethod::StructuredSelector, structured_selector),
    (ExtractionMethod::LargestTextBlock, largest_text_block),
    (ExtractionMethod::RawVisibleText, raw_visible_text),
];

/// One strategy's output as recorded in validation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyOutput {
    pub method: ExtractionMethod,
    pub chars: usize,
    pub met_threshold: bool,
    pub text: String,
}

/// Every strategy's output for one capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionTrace {
    pub source_url: Url,
    pub min_chars: usize,
    pub strategies: Vec<StrategyOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub content: ExtractedContent,
    /// Present only when the extractor runs in validation mode.
    pub trace: Option<ExtractionTrace>,
}

#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    pub min_chars: usize,
    pub validate: bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHARS,
            validate: false,
        }
    }
}

impl Extractor {
    pub fn new(min_chars: usize, validate: bool) -> Self {
        Self {
            min_chars,
            validate,
        }
    }

    /// Run the strategy chain. Never fails; an unusable page yields
    /// `ValidationStatus::Insufficient`.
    pub fn extract(&self, capture: &PageCapture) -> Extraction {
        let mut chosen: Option<(ExtractionMethod, String)> = None;
        let mut fallback = String::new();
        let mut trace = self.validate.then(|| ExtractionTrace {
            source_url: capture.url.clone(),
            min_chars: self.min_chars,
            strategies: Vec::with_capacity(STRATEGIES.len()),
        });

        for (method, strategy) in STRATEGIES {
            let text = strategy(capture, self.min_chars)
                .map(|t| clean_text(&t))
                .unwrap_or_default();
            let chars = text.chars().count();
            let met_threshold = chars >= self.min_chars;

            if let Some(trace) = trace.as_mut() {
                trace.strategies.push(StrategyOutput {
                    method,
                    chars,
                    met_threshold,
                    text: text.clone(),
                });
            }

            if chosen.is_none() {
                if met_threshold {
                    chosen = Some((method, text));
                    if trace.is_none() {
                        break;
                    }
                } else if method == ExtractionMethod::RawVisibleText {
                    fallback = text;
                }
            }
        }

        let (method, cleaned_text, status) = match chosen {
            Some((method, text)) => (method, text, ValidationStatus::Sufficient),
            None => (
                ExtractionMethod::RawVisibleText,
                fallback,
                ValidationStatus::Insufficient,
            ),
        };

        tracing::debug!(
            target: "web.extract",
            url = %capture.url,
            ?method,
            ?status,
            chars = cleaned_text.chars().count(),
            "Extraction finished"
        );

        let content = ExtractedContent {
            source_url: capture.url.clone(),
            title: capture.title.clone().or_else(|| document_title(&capture.html)),
            checksum: blake3::hash(cleaned_text.as_bytes()).to_hex().to_string(),
            cleaned_text,
            method,
            status,
        };
        Extraction { content, trace }
    }
}

/// Text of the first well-known content container whose text reaches
/// `min_chars`.
///
/// Containers that come up short are passed over for later selectors; when
/// none reaches the threshold the first non-empty one is returned so the
/// validation trace still shows what was found.
pub fn structured_selector(capture: &PageCapture, min_chars: usize) -> Option<String> {
    if capture.html.trim().is_empty() {
        return None;
    }
    let document = Html::parse_document(&capture.html);
    let mut short: Option<String> = None;

    for raw in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        // Outermost matches only, so nested containers are not counted twice.
        let blocks: Vec<String> = document
            .select(&selector)
            .filter(|el| {
                !el.ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| selector.matches(&a))
            })
            .map(element_text)
            .filter(|t| !t.trim().is_empty())
            .collect();
        if blocks.is_empty() {
            continue;
        }
        let text = blocks.join("\n\n");
        if clean_text(&text).chars().count() >= min_chars {
            return Some(text);
        }
        short.get_or_insert(text);
    }
    short
}

/// Paragraphs of the parent element with the most paragraph text.
pub fn largest_text_block(capture: &PageCapture, _min_chars: usize) -> Option<String> {
    if capture.html.trim().is_empty() {
        return None;
    }
    let document = Html::parse_document(&capture.html);
    let selector = Selector::parse("p").ok()?;

    // Vec keeps document order for deterministic tie-breaks.
    let mut groups: Vec<(ElementRef<'_>, Vec<String>, usize)> = Vec::new();
    for p in document.select(&selector) {
        if p.ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| SKIPPED_TAGS.contains(&a.value().name()))
        {
            continue;
        }
        let text = collapse_inline(&element_text(p));
        let chars = text.chars().count();
        if chars <= MIN_PARAGRAPH_CHARS {
            continue;
        }
        let Some(parent) = p.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        match groups.iter_mut().find(|(id, _, _)| *id == parent) {
            Some((_, paragraphs, total)) => {
                paragraphs.push(text);
                *total += chars;
            }
            None => groups.push((parent, vec![text], chars)),
        }
    }

    let mut best: Option<&(ElementRef<'_>, Vec<String>, usize)> = None;
    for group in &groups {
        if best.is_none_or(|b| group.2 > b.2) {
            best = Some(group);
        }
    }
    best.map(|(_, paragraphs, _)| paragraphs.join("\n\n"))
}

/// Whatever the browser rendered as visible text, else the DOM body text.
pub fn raw_visible_text(capture: &PageCapture, _min_chars: usize) -> Option<String> {
    if !capture.visible_text.trim().is_empty() {
        return Some(capture.visible_text.clone());
    }
    if capture.html.trim().is_empty() {
        return None;
    }
    let document = Html::parse_document(&capture.html);
    let selector = Selector::parse("body").ok()?;
    document.select(&selector).next().map(element_text)
}

/// Normalise whitespace: trimmed lines, single spaces, at most one blank line.
///
/// ```
/// use researcher_web::extract::clean_text;
///
/// assert_eq!(clean_text("  a\t b \r\n\r\n\r\n c  "), "a b\n\nc");
/// ```
pub fn clean_text(raw: &str) -> String {
    let normalised = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out: Vec<String> = Vec::new();
    let mut blank_run = false;
    for line in normalised.lines() {
        let line = collapse_inline(line);
        if line.is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if blank_run {
            out.push(String::new());
            blank_run = false;
        }
        out.push(line);
    }
    out.join("\n")
}

fn collapse_inline(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn document_title(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next().map(element_text)?;
    let title = collapse_inline(&title);
    (!title.is_empty()).then_some(title)
}

/// Text under `el`, skipping non-content subtrees and breaking lines at
/// block elements.
fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, &mut out);
    out
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child_el.value().name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child_el, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}
