//! Research Pipeline Coordinator.
//!
//! A run owns one [`ResearchContext`] (browser session, model tiers,
//! extractor, search settings) from acquisition to release and walks
//! `Init → Searching → (Fetching → Extracting → Summarizing)* → Synthesizing → Done`.
//! Per-source failures become skipped sources; only search failure,
//! "nothing survived" and a failed synthesis end a run early, as a
//! [`RunFailure`] that still carries the lineage gathered so far.
//!
//! - [`context`]: run-scoped resources and settings
//! - [`coordinator`]: the research workflow and per-source processing
//! - [`comedy`]: trending topics to late-night bits
//! - [`lineage`]: debug/validate artifacts linking each summary to its source

pub mod comedy;
pub mod context;
pub mod coordinator;
pub mod lineage;

pub use comedy::{ComedyRun, ComedySegment};
pub use context::{PipelineSettings, ResearchContext};
pub use coordinator::{Coordinator, ResearchRun, RunFailure, RunResult};
pub use lineage::{SourceOutcome, SourceTrace};
