//! Repository pages are read through a plain-text digest mirror.

use tracing::info;

use super::ExtractionResult;
use crate::browser::driver::PageDriver;
use crate::browser::navigation::wait_for_element;
use crate::config::Config;
use crate::error::BrowserError;

pub const MIRROR_BASE: &str = "https://gitingest.com";

/// Element holding the digest on the mirror's result page.
pub const MIRROR_RESULT_SELECTOR: &str = "textarea";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoMirror {
    pub owner: String,
    pub repo: String,
    pub url: String,
}

impl RepoMirror {
    pub fn title(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Map `https://github.com/<owner>/<repo>` onto its mirror. Any other URL,
/// including deeper repository paths, returns `None`.
pub fn mirror_for(url: &str) -> Option<RepoMirror> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host != "github.com" && host != "www.github.com" {
        return None;
    }

    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    let [owner, repo] = segments.as_slice() else {
        return None;
    };

    Some(RepoMirror {
        owner: owner.to_string(),
        repo: repo.to_string(),
        url: format!("{}/{}/{}", MIRROR_BASE, owner, repo),
    })
}

pub async fn extract_mirror(
    page: &dyn PageDriver,
    mirror: &RepoMirror,
    config: &Config,
) -> Result<ExtractionResult, BrowserError> {
    info!("Reading {} through {}", mirror.title(), mirror.url);
    page.goto(&mirror.url, config.timeout_profiles.navigation())
        .await?;

    if !wait_for_element(
        page,
        MIRROR_RESULT_SELECTOR,
        config.timeout_profiles.content(),
        false,
    )
    .await
    {
        return Err(BrowserError::Timeout(format!(
            "Waiting for selector `{}` timed out on {}",
            MIRROR_RESULT_SELECTOR, mirror.url
        )));
    }

    let text = page
        .value_of(MIRROR_RESULT_SELECTOR)
        .await?
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            BrowserError::Extraction(format!("Mirror returned no content for {}", mirror.title()))
        })?;

    Ok(ExtractionResult {
        url: mirror.url.clone(),
        title: Some(mirror.title()),
        text_content: Some(text),
        ..Default::default()
    })
}
