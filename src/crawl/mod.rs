//! Depth-bounded crawl of same-domain links from a root page.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture, FutureExt};
use scraper::{Html, Selector};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::driver::PageDriver;
use crate::browser::session::Session;
use crate::config::Config;
use crate::error::BrowserError;
use crate::extract::{ContentExtractor, ExtractionOutcome, ExtractionResult, ExtractionStatus};

pub const MAX_DEPTH: u32 = 5;
pub const MAX_PAGE_TEXT: usize = 20_000;
const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Links kept per page after ranking.
const MAX_LINKS_PER_PAGE: usize = 10;
/// Links actually followed from each page.
const MAX_FOLLOWED_LINKS: usize = 3;

const EXCLUDED_PREFIXES: &[&str] = &["#", "javascript:", "data:", "vbscript:", "mailto:", "tel:"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub status: ExtractionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub root_url: String,
    pub exploration_depth: u32,
    pub pages_explored: usize,
    pub content: Vec<ExtractionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: String,
    pub text: String,
}

/// Clamp a requested depth to `1..=MAX_DEPTH`. Missing means 1.
pub fn clamp_depth(depth: Option<u32>) -> u32 {
    depth.unwrap_or(1).clamp(1, MAX_DEPTH)
}

/// Canonical form used for the visited set: absolute, fragment stripped.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split('#').next().unwrap_or(url).to_string(),
    }
}

pub fn truncate_text(text: String) -> String {
    match text.char_indices().nth(MAX_PAGE_TEXT) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_SUFFIX),
        None => text,
    }
}

/// Same-host links in `html`, ranked by anchor text length, at most ten.
pub fn discover_links(html: &str, base_url: &str) -> Vec<DiscoveredLink> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let Some(base_host) = base.host_str().map(str::to_string) else {
        return Vec::new();
    };
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut links: Vec<DiscoveredLink> = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        let lower = href.to_ascii_lowercase();
        if EXCLUDED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }

        let Ok(absolute) = base.join(href) else {
            continue;
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            continue;
        }
        if absolute.host_str() != Some(base_host.as_str()) {
            continue;
        }

        let text = anchor
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let url = absolute.to_string();
        links.push(DiscoveredLink {
            text: if text.is_empty() { url.clone() } else { text },
            url,
        });
    }

    links.sort_by(|a, b| b.text.chars().count().cmp(&a.text.chars().count()));

    let mut seen = HashSet::new();
    links.retain(|link| seen.insert(normalize_url(&link.url)));
    links.truncate(MAX_LINKS_PER_PAGE);
    links
}

fn summarize(root_url: &str, depth: u32, results: Vec<ExtractionResult>) -> CrawlResult {
    let total = results.len();
    let successes = results.iter().filter(|r| r.is_success()).count();

    let (status, message) = if total > 0 && successes == total {
        (ExtractionStatus::Success, None)
    } else if successes > 0 {
        (
            ExtractionStatus::SuccessWithPartial,
            Some(format!(
                "Fetched {}/{} pages successfully. Some pages failed or timed out.",
                successes, total
            )),
        )
    } else if total > 0 {
        (
            ExtractionStatus::Error,
            Some(
                "Failed to fetch all content. Initial page fetch might have failed or timed out."
                    .to_string(),
            ),
        )
    } else {
        (
            ExtractionStatus::Error,
            Some(
                "Failed to fetch any content. Initial page fetch might have failed or timed out."
                    .to_string(),
            ),
        )
    };

    CrawlResult {
        status,
        message,
        root_url: root_url.to_string(),
        exploration_depth: depth,
        pages_explored: total,
        content: results,
    }
}

/// Result for a crawl cut short by `error`, keeping whatever was collected.
pub(crate) fn summarize_failure(
    root_url: &str,
    depth: u32,
    results: Vec<ExtractionResult>,
    error: &str,
) -> CrawlResult {
    let any_success = results.iter().any(|r| r.is_success());
    let (status, message) = if any_success {
        (
            ExtractionStatus::SuccessWithPartial,
            format!(
                "Operation failed: {}. Returning partial results collected before failure.",
                error
            ),
        )
    } else {
        (
            ExtractionStatus::Error,
            format!("Recursive fetch failed: {}", error),
        )
    };

    CrawlResult {
        status,
        message: Some(message),
        root_url: root_url.to_string(),
        exploration_depth: depth,
        pages_explored: results.len(),
        content: results,
    }
}

#[derive(Default)]
struct CrawlState {
    visited: HashSet<String>,
    results: Vec<ExtractionResult>,
}

/// Shared by every branch of one crawl.
#[derive(Clone, Default)]
struct CrawlContext {
    state: Arc<Mutex<CrawlState>>,
    timed_out: Arc<AtomicBool>,
}

pub struct RecursiveCrawler {
    session: Arc<Session>,
    extractor: Arc<ContentExtractor>,
    config: Arc<Config>,
}

impl RecursiveCrawler {
    pub fn new(session: Arc<Session>, extractor: Arc<ContentExtractor>, config: Arc<Config>) -> Self {
        Self {
            session,
            extractor,
            config,
        }
    }

    /// Extract `root_url` and, for depth above 1, the pages it links to.
    pub async fn crawl(&self, root_url: &str, depth: u32) -> ExtractionOutcome {
        let depth = depth.clamp(1, MAX_DEPTH);
        if depth == 1 {
            return match self.session.ensure_ready().await {
                Ok(page) => self.extractor.extract(page.as_ref(), root_url).await,
                Err(e) => ExtractionOutcome::page_error(root_url, &e),
            };
        }
        ExtractionOutcome::Crawl(self.crawl_recursive(root_url, depth).await)
    }

    async fn crawl_recursive(&self, root_url: &str, depth: u32) -> CrawlResult {
        let deadline = self.config.crawl_deadline();
        let ctx = CrawlContext::default();
        info!("Starting crawl of {} to depth {}", root_url, depth);

        let outcome = tokio::select! {
            result = self.visit(root_url.to_string(), 1, depth, ctx.clone()) => result,
            _ = tokio::time::sleep(deadline) => {
                ctx.timed_out.store(true, Ordering::SeqCst);
                Err(BrowserError::Timeout(format!(
                    "Recursive fetch timed out after {}ms",
                    deadline.as_millis()
                )))
            }
        };

        let results = {
            let mut state = ctx.state.lock().await;
            std::mem::take(&mut state.results)
        };
        match outcome {
            Ok(()) => summarize(root_url, depth, results),
            Err(e) => {
                warn!("Crawl of {} stopped early: {}", root_url, e);
                summarize_failure(root_url, depth, results, &e.to_string())
            }
        }
    }

    fn visit(
        &self,
        url: String,
        depth: u32,
        max_depth: u32,
        ctx: CrawlContext,
    ) -> BoxFuture<'_, Result<(), BrowserError>> {
        async move {
            if depth > max_depth || ctx.timed_out.load(Ordering::SeqCst) {
                return Ok(());
            }
            if !ctx.state.lock().await.visited.insert(normalize_url(&url)) {
                debug!("Already visited {}", url);
                return Ok(());
            }

            info!("[Depth {}] Fetching: {}", depth, url);
            let (result, links) = if depth == 1 {
                let page = self.session.ensure_ready().await?;
                self.fetch(page.as_ref(), &url, true).await
            } else {
                match self.session.open_page().await {
                    Ok(page) => {
                        let fetched = self.fetch(page.as_ref(), &url, false).await;
                        if let Err(e) = page.close().await {
                            debug!("Ignoring error closing branch page: {}", e);
                        }
                        fetched
                    }
                    Err(e) => (ExtractionResult::failed(&url, e.to_string()), Vec::new()),
                }
            };

            let succeeded = result.is_success();
            ctx.state.lock().await.results.push(result);

            if depth < max_depth && succeeded && !links.is_empty() {
                let branches = links
                    .into_iter()
                    .take(MAX_FOLLOWED_LINKS)
                    .map(|link| self.visit(link.url, depth + 1, max_depth, ctx.clone()));
                for outcome in join_all(branches).await {
                    if let Err(e) = outcome {
                        warn!("Branch under {} failed: {}", url, e);
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Extract one page and rank its links. Errors are folded into the result.
    async fn fetch(
        &self,
        page: &dyn PageDriver,
        url: &str,
        root: bool,
    ) -> (ExtractionResult, Vec<DiscoveredLink>) {
        let extraction = if root {
            self.extractor.extract_page(page, url).await
        } else {
            self.extractor.read_page(page, url).await
        };

        match extraction {
            Ok(extraction) => {
                let links = extraction
                    .html
                    .as_deref()
                    .map(|html| discover_links(html, url))
                    .unwrap_or_default();
                let mut result = extraction.result;
                result.text_content = result.text_content.map(truncate_text);
                (result, links)
            }
            Err(e) => {
                warn!("Error fetching {}: {}", url, e);
                (ExtractionResult::failed(url, e.to_string()), Vec::new())
            }
        }
    }
}
