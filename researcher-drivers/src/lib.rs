//! Driver layer for browser automation.
//!
//! This crate exposes the WebDriver session and page helpers used to load
//! research sources while keeping automation signals low.
//!
//! - [`browser::driver::ResearchDriver`]: WebDriver client wrapper
//! - [`browser::page::ResearchPage`]: title, source, visible text, screenshot
//! - [`browser::behavioral::BehavioralEngine`]: human-like pauses and scrolling
//! - [`browser::fingerprint::FingerprintPool`]: per-navigation fingerprints
//! - [`browser::stealth`]: Chrome arguments and JS evasions per stealth level
pub mod browser;

pub use browser::driver::{DriverOptions, ResearchDriver};
pub use browser::page::{PageSnapshot, ResearchPage};
