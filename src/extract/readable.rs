//! Main-content extraction from rendered HTML.

use std::io::Cursor;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::{ExtractionResult, ExtractionStatus};
use crate::error::BrowserError;

/// Containers tried, in order, when readability finds nothing useful.
pub const FALLBACK_SELECTORS: &[&str] = &[
    "article",
    "main",
    r#"[role="main"]"#,
    "#content",
    ".content",
    "#main",
    ".main",
    ".post-content",
    ".entry-content",
    ".article-body",
];

pub const BODY_FALLBACK_LABEL: &str = "body (filtered)";

const NON_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];
const BOILERPLATE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "template", "form",
];

const MIN_SELECTOR_TEXT: usize = 100;
const MIN_BODY_TEXT: usize = 200;

/// `<meta>` derived fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub excerpt: Option<String>,
    pub site_name: Option<String>,
    pub byline: Option<String>,
}

impl PageMeta {
    pub fn from_document(document: &Html) -> Self {
        Self {
            excerpt: meta_content(
                document,
                &[r#"meta[name="description"]"#, r#"meta[property="og:description"]"#],
            ),
            site_name: meta_content(document, &[r#"meta[property="og:site_name"]"#]),
            byline: meta_content(document, &[r#"meta[name="author"]"#]),
        }
    }
}

fn meta_content(document: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let selector = Selector::parse(s).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
            .map(str::to_string)
    })
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text under `root`, skipping anything inside `skip_tags` or aria-hidden
/// elements.
pub fn collect_text(root: ElementRef<'_>, skip_tags: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .filter_map(|a| a.value().as_element())
            .any(|el| skip_tags.contains(&el.name()) || el.attr("aria-hidden") == Some("true"));
        if !hidden {
            parts.push(&**text);
        }
    }
    normalize_whitespace(&parts.join(" "))
}

/// First fallback container with enough text, as `(selector, text)`.
pub fn selector_fallback(document: &Html) -> Option<(&'static str, String)> {
    for &candidate in FALLBACK_SELECTORS {
        let Ok(selector) = Selector::parse(candidate) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = collect_text(element, NON_TEXT_TAGS);
            if text.chars().count() > MIN_SELECTOR_TEXT {
                return Some((candidate, text));
            }
        }
    }
    None
}

/// Body text with navigation, forms and other chrome removed.
pub fn filtered_body_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("body").ok()?;
    let body = document.select(&selector).next()?;
    let text = collect_text(body, BOILERPLATE_TAGS);
    (text.chars().count() > MIN_BODY_TEXT).then_some(text)
}

fn document_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let title = document.select(&selector).next()?.text().collect::<String>();
    let title = normalize_whitespace(&title);
    (!title.is_empty()).then_some(title)
}

struct Article {
    title: String,
    text: String,
}

fn readability_article(html: &str, url: &str) -> Option<Article> {
    let parsed = url::Url::parse(url).ok()?;
    let mut cursor = Cursor::new(html.as_bytes());
    match readability::extractor::extract(&mut cursor, &parsed) {
        Ok(product) => Some(Article {
            title: product.title.trim().to_string(),
            text: product.text.trim().to_string(),
        }),
        Err(e) => {
            debug!("Readability failed for {}: {}", url, e);
            None
        }
    }
}

/// Extract the readable content of `html`, loaded from `url`.
///
/// Readability output wins when its text is longer than the title. Otherwise
/// the first fallback container with enough text is used, then the filtered
/// body.
pub fn extract_readable(
    html: &str,
    url: &str,
    page_title: Option<String>,
) -> Result<(ExtractionStatus, ExtractionResult), BrowserError> {
    let document = Html::parse_document(html);
    let meta = PageMeta::from_document(&document);
    let page_title = page_title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| document_title(&document));

    let base = ExtractionResult {
        url: url.to_string(),
        title: page_title.clone(),
        excerpt: meta.excerpt,
        site_name: meta.site_name,
        byline: meta.byline,
        ..Default::default()
    };

    if let Some(article) = readability_article(html, url) {
        let title = if article.title.is_empty() {
            page_title.unwrap_or_default()
        } else {
            article.title
        };
        if !article.text.is_empty() && article.text.chars().count() > title.chars().count() {
            info!("Readability extracted {} chars from {}", article.text.len(), url);
            return Ok((
                ExtractionStatus::Success,
                ExtractionResult {
                    title: (!title.is_empty()).then_some(title),
                    text_content: Some(article.text),
                    ..base
                },
            ));
        }
    }

    if let Some((selector, text)) = selector_fallback(&document) {
        info!("Using fallback selector {} for {}", selector, url);
        return Ok((
            ExtractionStatus::SuccessWithFallback,
            ExtractionResult {
                text_content: Some(text),
                fallback_selector: Some(selector.to_string()),
                ..base
            },
        ));
    }

    if let Some(text) = filtered_body_text(&document) {
        info!("Using filtered body text for {}", url);
        return Ok((
            ExtractionStatus::SuccessWithFallback,
            ExtractionResult {
                text_content: Some(text),
                fallback_selector: Some(BODY_FALLBACK_LABEL.to_string()),
                ..base
            },
        ));
    }

    Err(BrowserError::Extraction(
        "No meaningful content extracted".to_string(),
    ))
}
