//! Web discovery and acquisition.
//!
//! - Retrying browser navigation over a swappable page loader (`browser`)
//! - Content extraction with ordered fallback strategies (`extract`)
//! - Lazy, deduplicated search result streams (`search`)
//! - Trending-topics page capture (`trends`)

pub mod browser;
pub mod extract;
pub mod search;
pub mod trends;

pub use browser::{BrowserController, BrowserSettings, FantocciniLoader, PageLoader, RetryPolicy};
pub use extract::Extractor;
pub use search::{SearchFlavor, SearchOrchestrator};
