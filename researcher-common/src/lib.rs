//! Common types and utilities shared across the researcher crates.
//!
//! This crate defines the research data model, the error taxonomy and the
//! observability helpers used throughout the workspace. It is intentionally
//! lightweight so that every crate can depend on it without pulling in the
//! browser or HTTP stacks.
//!
//! # Overview
//!
//! - [`model`]: the per-run artifacts, from [`model::SearchResult`] through
//!   [`model::ResearchReport`]
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`ResearchError`] and [`Result`]: shared error handling
//! - [`FailureKind`]: the serialisable reason a single source was skipped
//! - [`StealthLevel`]: how aggressively the browser hides automation signals
//!
//! # Examples
//!
//! ```rust
//! use researcher_common::{FailureKind, ResearchError, SourceStage};
//!
//! let err = ResearchError::ModelOutputInvalid("empty response".into());
//! assert_eq!(err.failure_kind(SourceStage::Summarizing), FailureKind::ModelOutputInvalid);
//! assert!(!err.is_run_level());
//! ```
use serde::{Deserialize, Serialize};

pub mod model;
pub mod observability;

pub use model::SourceStage;

/// Browser automation stealth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    Lightweight,
    #[default]
    Balanced,
    Maximum,
}

/// Why a single source was dropped from a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    NavigationFailure,
    ExtractionInsufficient,
    ModelUnavailable,
    ModelOutputInvalid,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::NavigationFailure => "NavigationFailure",
            FailureKind::ExtractionInsufficient => "ExtractionInsufficient",
            FailureKind::ModelUnavailable => "ModelUnavailable",
            FailureKind::ModelOutputInvalid => "ModelOutputInvalid",
        };
        f.write_str(name)
    }
}

/// Error types used across the research pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ResearchError {
    /// A page could not be loaded (timeout, connection failure, block).
    #[error("Navigation failed for {url}: {reason}")]
    NavigationFailure { url: String, reason: String },

    /// No extraction strategy produced enough text.
    #[error("Extraction insufficient for {url}: best strategy produced {chars} chars")]
    ExtractionInsufficient { url: String, chars: usize },

    /// The inference endpoint could not be reached or refused the request.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model answered with empty or malformed output.
    #[error("Model output invalid: {0}")]
    ModelOutputInvalid(String),

    /// Every candidate source was skipped.
    #[error("No usable sources: {skipped} candidate(s) skipped")]
    NoUsableSources { skipped: usize },

    /// The search stage itself failed before producing candidates.
    #[error("Search failed: {0}")]
    SearchFailed(String),

    /// The reasoning tier could not produce the final synthesis.
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(Box<ResearchError>),

    /// A driver (browser, network, etc.) reported an error.
    #[error("Driver error: {0}")]
    Driver(#[from] anyhow::Error),

    /// Configuration was incomplete or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation exceeded the configured stage timeout.
    #[error("Timeout occurred")]
    Timeout,
}

impl ResearchError {
    /// Errors that end the whole run rather than a single source.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            ResearchError::NoUsableSources { .. }
                | ResearchError::SearchFailed(_)
                | ResearchError::SynthesisFailed(_)
        )
    }

    /// Classify this error as a per-source skip reason.
    ///
    /// Errors without a natural per-source kind (timeouts, driver and config
    /// faults) take the kind of the stage they interrupted.
    pub fn failure_kind(&self, stage: SourceStage) -> FailureKind {
        match self {
            ResearchError::NavigationFailure { .. } => FailureKind::NavigationFailure,
            ResearchError::ExtractionInsufficient { .. } => FailureKind::ExtractionInsufficient,
            ResearchError::ModelUnavailable(_) => FailureKind::ModelUnavailable,
            ResearchError::ModelOutputInvalid(_) => FailureKind::ModelOutputInvalid,
            _ => match stage {
                SourceStage::Fetching => FailureKind::NavigationFailure,
                SourceStage::Extracting => FailureKind::ExtractionInsufficient,
                SourceStage::Summarizing => FailureKind::ModelUnavailable,
            },
        }
    }
}

/// Convenient alias for results that use [`ResearchError`].
pub type Result<T> = std::result::Result<T, ResearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_take_the_kind_of_the_interrupted_stage() {
        assert_eq!(
            ResearchError::Timeout.failure_kind(SourceStage::Fetching),
            FailureKind::NavigationFailure
        );
        assert_eq!(
            ResearchError::Timeout.failure_kind(SourceStage::Summarizing),
            FailureKind::ModelUnavailable
        );
    }

    #[test]
    fn run_level_errors_are_flagged() {
        assert!(ResearchError::NoUsableSources { skipped: 3 }.is_run_level());
        assert!(ResearchError::SearchFailed("blocked".into()).is_run_level());
        assert!(!ResearchError::ModelUnavailable("down".into()).is_run_level());
        let synthesis = ResearchError::SynthesisFailed(Box::new(ResearchError::Timeout));
        assert!(synthesis.is_run_level());
        assert_eq!(synthesis.to_string(), "Synthesis failed: Timeout occurred");
    }

    #[test]
    fn stealth_level_reads_lowercase() {
        let level: StealthLevel = serde_json::from_str("\"maximum\"").unwrap();
        assert_eq!(level, StealthLevel::Maximum);
        assert_eq!(StealthLevel::default(), StealthLevel::Balanced);
    }
}
