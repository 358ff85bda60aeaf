//! Query-based source discovery over DuckDuckGo's HTML endpoint.
//!
//! Result pages are loaded through the same [`BrowserController`] as
//! articles, one page at a time and only while the consumer keeps polling
//! the stream.

use std::collections::HashSet;

use futures::Stream;
use researcher_common::model::SearchResult;
use researcher_common::{ResearchError, Result};
use scraper::{Html, Selector};
use url::Url;

use crate::browser::{BrowserController, PageLoader};

pub const DDG_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
pub const RESULTS_PER_PAGE: usize = 30;
pub const DEFAULT_MAX_PAGES: usize = 3;

/// Query parameters dropped before comparing or yielding URLs.
const TRACKING_PARAMS: [&str; 14] = [
    "fbclid", "gclid", "dclid", "msclkid", "yclid", "mc_cid", "mc_eid", "igshid", "ref",
    "ref_src", "_ga", "_hsenc", "_hsmi", "spm",
];

const BLOCK_MARKERS: [&str; 2] = ["anomaly-modal", "bots use DuckDuckGo too"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchFlavor {
    #[default]
    Web,
    /// Restricted to the past week.
    News,
}

/// A result link as it appears on the page, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHit {
    pub href: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct SearchOrchestrator {
    blocked_sites: Vec<String>,
    flavor: SearchFlavor,
    max_pages: usize,
}

impl SearchOrchestrator {
    pub fn new(blocked_sites: Vec<String>) -> Self {
        Self {
            blocked_sites: blocked_sites
                .into_iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            flavor: SearchFlavor::Web,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_flavor(mut self, flavor: SearchFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// URL of the zero-based result page `page` for `query`.
    pub fn page_url(&self, query: &str, page: usize) -> Result<Url> {
        let mut url =
            Url::parse(DDG_HTML_ENDPOINT).map_err(|e| ResearchError::Config(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            if page > 0 {
                pairs.append_pair("s", &(page * RESULTS_PER_PAGE).to_string());
            }
            if self.flavor == SearchFlavor::News {
                pairs.append_pair("df", "w");
            }
        }
        Ok(url)
    }

    /// Ordered, deduplicated results for `query`, at most `limit` of them.
    ///
    /// A failure to load the first result page is
    /// [`ResearchError::SearchFailed`]; later page failures end the stream.
    /// No results at all is an empty stream.
    pub fn search<'a, L: PageLoader>(
        &'a self,
        browser: &'a mut BrowserController<L>,
        query: &'a str,
        limit: usize,
    ) -> impl Stream<Item = Result<SearchResult>> + 'a {
        async_stream::try_stream! {
            let mut seen = HashSet::new();
            let mut rank = 0usize;

            for page in 0..self.max_pages {
                if rank >= limit {
                    break;
                }
                let url = self.page_url(query, page)?;
                let capture = browser.navigate(&url).await;

                let blocked = BLOCK_MARKERS.iter().any(|m| capture.html.contains(m));
                if !capture.success || blocked {
                    let reason = capture
                        .failure
                        .unwrap_or_else(|| "search engine served a bot challenge".to_string());
                    tracing::warn!(target: "web.search", %query, page, %reason, "Result page unavailable");
                    if page == 0 {
                        Err(ResearchError::SearchFailed(reason))?;
                    }
                    break;
                }

                let hits = parse_results_page(&capture.html);
                tracing::info!(target: "web.search", %query, page, hit_count = hits.len(), "Result page parsed");
                if hits.is_empty() {
                    break;
                }

                for hit in hits {
                    let Some(url) = resolve_result_link(&hit.href) else {
                        continue;
                    };
                    if self.is_blocked(&url) {
                        tracing::debug!(target: "web.search", %url, "Skipping blocked site");
                        continue;
                    }
                    if !seen.insert(normalize_url(&url)) {
                        continue;
                    }
                    rank += 1;
                    yield SearchResult {
                        url: strip_tracking(&url),
                        title: hit.title,
                        snippet: hit.snippet,
                        rank,
                    };
                    if rank >= limit {
                        break;
                    }
                }
            }
        }
    }

    fn is_blocked(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.to_ascii_lowercase();
        self.blocked_sites
            .iter()
            .any(|site| host == *site || host.ends_with(&format!(".{site}")))
    }
}

/// Result links, titles and snippets in display order.
pub fn parse_results_page(html: &str) -> Vec<RawHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse("a.result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let mut hits = Vec::new();
    for result in document.select(&result_sel) {
        // Sponsored results carry the ad class on the container.
        if result
            .value()
            .classes()
            .any(|c| c == "result--ad" || c == "result--ads")
        {
            continue;
        }
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = squash(&link.text().collect::<String>());
        let snippet = result
            .select(&snippet_sel)
            .next()
            .map(|s| squash(&s.text().collect::<String>()))
            .unwrap_or_default();
        hits.push(RawHit {
            href: href.to_string(),
            title,
            snippet,
        });
    }
    hits
}

/// The destination of a result link: decodes DuckDuckGo redirects and
/// rejects links back into the engine, scripts and fragments.
pub fn resolve_result_link(href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;

    let target = if is_engine_host(&url) {
        let (_, uddg) = url.query_pairs().find(|(k, _)| k == "uddg")?;
        Url::parse(&uddg).ok()?
    } else {
        url
    };

    if !matches!(target.scheme(), "http" | "https") || is_engine_host(&target) {
        return None;
    }
    Some(target)
}

fn is_engine_host(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"))
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// `url` without tracking parameters or fragment.
pub fn strip_tracking(url: &Url) -> Url {
    let mut out = url.clone();
    out.set_fragment(None);
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        out.set_query(None);
    } else {
        out.query_pairs_mut().clear().extend_pairs(kept);
    }
    out
}

/// Deduplication key: lowercase host without `www.`, path without trailing
/// slash, and the sorted non-tracking query pairs. Scheme and fragment are
/// ignored.
///
/// ```
/// use researcher_web::search::normalize_url;
/// use url::Url;
///
/// let a = Url::parse("https://www.example.com/post/?utm_source=x&id=7").unwrap();
/// let b = Url::parse("http://example.com/post?id=7#comments").unwrap();
/// assert_eq!(normalize_url(&a), normalize_url(&b));
/// ```
pub fn normalize_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = url.path().trim_end_matches('/');
    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();

    let mut key = format!("{host}{path}");
    if !query.is_empty() {
        let joined = query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        key.push('?');
        key.push_str(&joined);
    }
    key
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_links_are_decoded() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.org%2Fa%3Fx%3D1&rut=abc";
        assert_eq!(
            resolve_result_link(href).unwrap().as_str(),
            "https://example.org/a?x=1"
        );
    }

    #[test]
    fn engine_script_and_fragment_links_are_rejected() {
        assert!(resolve_result_link("#top").is_none());
        assert!(resolve_result_link("javascript:void(0)").is_none());
        assert!(resolve_result_link("/settings").is_none());
        assert!(resolve_result_link("https://duckduckgo.com/?q=x").is_none());
        assert!(resolve_result_link("mailto:a@b.c").is_none());
    }

    #[test]
    fn tracking_parameters_do_not_affect_identity() {
        let a = Url::parse("https://example.org/a?utm_campaign=z&fbclid=1").unwrap();
        let b = Url::parse("https://example.org/a").unwrap();
        let c = Url::parse("https://example.org/a?page=2").unwrap();
        assert_eq!(normalize_url(&a), normalize_url(&b));
        assert_ne!(normalize_url(&a), normalize_url(&c));
        assert_eq!(strip_tracking(&a).as_str(), "https://example.org/a");
    }

    #[test]
    fn page_urls_carry_offset_and_freshness() {
        let news = SearchOrchestrator::new(vec![]).with_flavor(SearchFlavor::News);
        let url = news.page_url("open source LLMs", 2).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "open source LLMs".into())));
        assert!(pairs.contains(&("s".into(), "60".into())));
        assert!(pairs.contains(&("df".into(), "w".into())));
    }

    #[test]
    fn blocked_sites_match_subdomains() {
        let search = SearchOrchestrator::new(vec!["nytimes.com".into()]);
        assert!(search.is_blocked(&Url::parse("https://www.nytimes.com/x").unwrap()));
        assert!(!search.is_blocked(&Url::parse("https://notnytimes.com/x").unwrap()));
    }

    mod paging {
        use super::*;
        use crate::browser::RetryPolicy;
        use futures::StreamExt;
        use researcher_drivers::PageSnapshot;
        use std::collections::VecDeque;
        use std::time::Duration;

        /// Serves one canned result page per load; `None` means the load fails.
        struct Pages {
            pages: VecDeque<Option<String>>,
            loaded: Vec<Url>,
        }

        #[async_trait::async_trait]
        impl PageLoader for Pages {
            async fn load(&mut self, url: &Url) -> anyhow::Result<PageSnapshot> {
                self.loaded.push(url.clone());
                match self.pages.pop_front().flatten() {
                    Some(html) => Ok(PageSnapshot {
                        title: None,
                        visible_text: String::new(),
                        html,
                        screenshot_png: None,
                    }),
                    None => Err(anyhow::anyhow!("connection refused")),
                }
            }

            async fn release(&mut self) -> anyhow::Result<()> {
                Ok(())
            }
        }

        fn page(links: &[&str]) -> Option<String> {
            let body: String = links
                .iter()
                .map(|l| format!(r#"<div class="result"><a class="result__a" href="{l}">{l}</a></div>"#))
                .collect();
            Some(format!("<html><body>{body}</body></html>"))
        }

        fn browser(pages: Vec<Option<String>>) -> BrowserController<Pages> {
            BrowserController::with_loader(
                Pages {
                    pages: pages.into(),
                    loaded: Vec::new(),
                },
                RetryPolicy {
                    max_attempts: 1,
                    backoff: Duration::from_millis(10),
                },
                Duration::from_secs(5),
            )
        }

        #[tokio::test]
        async fn results_are_ranked_deduped_and_filtered() {
            let mut browser = browser(vec![
                page(&[
                    "https://example.org/a?utm_source=ddg",
                    "https://www.facebook.com/post",
                    "https://example.org/a/",
                    "https://other.net/b",
                ]),
                page(&["https://third.io/c", "https://fourth.io/d"]),
            ]);
            let search = SearchOrchestrator::new(vec!["facebook.com".into()]);
            let results: Vec<SearchResult> = search
                .search(&mut browser, "rust", 3)
                .map(|r| r.unwrap())
                .collect()
                .await;

            let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
            assert_eq!(
                urls,
                ["https://example.org/a", "https://other.net/b", "https://third.io/c"]
            );
            assert_eq!(
                results.iter().map(|r| r.rank).collect::<Vec<_>>(),
                [1, 2, 3]
            );
            assert_eq!(browser.loader().loaded.len(), 2);
        }

        #[tokio::test]
        async fn later_pages_are_not_loaded_until_polled() {
            let mut browser = browser(vec![
                page(&["https://one.org/", "https://two.org/"]),
                page(&["https://three.org/"]),
            ]);
            let search = SearchOrchestrator::new(vec![]);
            {
                let stream = search.search(&mut browser, "q", 10);
                futures::pin_mut!(stream);
                let first = stream.next().await.unwrap().unwrap();
                assert_eq!(first.rank, 1);
            }
            assert_eq!(browser.loader().loaded.len(), 1);
        }

        #[tokio::test]
        async fn first_page_failure_is_a_search_failure() {
            let mut browser = browser(vec![None]);
            let search = SearchOrchestrator::new(vec![]);
            let results: Vec<_> = search.search(&mut browser, "q", 3).collect().await;
            assert_eq!(results.len(), 1);
            assert!(matches!(results[0], Err(ResearchError::SearchFailed(_))));
        }

        #[tokio::test]
        async fn later_page_failure_ends_the_stream() {
            let mut browser = browser(vec![page(&["https://one.org/"]), None]);
            let search = SearchOrchestrator::new(vec![]);
            let results: Vec<_> = search.search(&mut browser, "q", 5).collect().await;
            assert_eq!(results.len(), 1);
            assert!(results[0].is_ok());
        }

        #[tokio::test]
        async fn no_results_is_an_empty_stream() {
            let mut browser = browser(vec![Some("<html><body>No results.</body></html>".into())]);
            let search = SearchOrchestrator::new(vec![]);
            let results: Vec<_> = search.search(&mut browser, "zzqx", 3).collect().await;
            assert!(results.is_empty());
        }
    }

    #[test]
    fn ads_are_skipped_when_parsing() {
        let html = r#"
            <div class="result results_links result--ad"><a class="result__a" href="https://ads.example/">Ad</a></div>
            <div class="result results_links"><a class="result__a" href="https://example.org/1"> First
              result </a><a class="result__snippet">Snippet one</a></div>"#;
        let hits = parse_results_page(html);
        assert_eq!(
            hits,
            vec![RawHit {
                href: "https://example.org/1".into(),
                title: "First result".into(),
                snippet: "Snippet one".into(),
            }]
        );
    }
}
