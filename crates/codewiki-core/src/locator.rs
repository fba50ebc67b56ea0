//! Repository identifier normalization.
//!
//! Callers name a repository in several ways: `owner/repo` shorthand, a
//! forge URL with or without a trailing path, or the documentation page URL
//! itself. [`RepoLocator::parse`] folds all of them into one value whose
//! [`RepoLocator::key`] is the single string used for cache keys and whose
//! [`RepoLocator::page_url`] is the navigation target.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{Error, Result};

/// Forges the documentation service generates wikis for.
const KNOWN_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[\w.\-]+/[\w.\-]+$").expect("static shorthand pattern")
});

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[\w.\-]+$").expect("static segment pattern")
});

/// Path segments made only of dots would walk out of the forge's namespace.
fn valid_segment(segment: &str) -> bool {
    SEGMENT.is_match(segment) && !segment.chars().all(|c| c == '.')
}

/// Normalized repository identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoLocator {
    host: String,
    owner: String,
    name: String,
}

impl RepoLocator {
    /// Parse any accepted input form.
    ///
    /// ```rust
    /// use codewiki_core::RepoLocator;
    ///
    /// let a = RepoLocator::parse("octocat/Hello-World")?;
    /// let b = RepoLocator::parse("https://github.com/octocat/hello-world/tree/main")?;
    /// assert_eq!(a.key(), b.key());
    /// # Ok::<(), codewiki_core::Error>(())
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("repo_url must not be empty".into()));
        }

        let locator = if SHORTHAND.is_match(trimmed) {
            let (owner, name) = trimmed.split_once('/').unwrap_or((trimmed, ""));
            Self::from_parts("github.com", owner, name)
        } else {
            Self::from_url(trimmed)
        }
        .ok_or_else(|| invalid(trimmed))?;

        debug!(input = trimmed, key = %locator.key(), "normalized repository locator");
        Ok(locator)
    }

    fn from_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.trim_start_matches("www.").to_ascii_lowercase();
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        if KNOWN_HOSTS.contains(&host.as_str()) {
            let owner = segments.next()?;
            let name = segments.next()?;
            return Self::from_parts(&host, owner, name);
        }

        // Documentation page URL: {base}/{forge}/{owner}/{name}
        let forge = segments.next()?.to_ascii_lowercase();
        if KNOWN_HOSTS.contains(&forge.as_str()) {
            let owner = segments.next()?;
            let name = segments.next()?;
            return Self::from_parts(&forge, owner, name);
        }
        None
    }

    fn from_parts(host: &str, owner: &str, name: &str) -> Option<Self> {
        let name = name.strip_suffix(".git").unwrap_or(name);
        if !valid_segment(owner) || !valid_segment(name) {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            owner: owner.to_ascii_lowercase(),
            name: name.to_ascii_lowercase(),
        })
    }

    /// Forge host, e.g. `github.com`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Repository owner, lowercased.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name, lowercased.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Canonical key: `host/owner/name`.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.host, self.owner, self.name)
    }

    /// Canonical forge URL, e.g. `https://github.com/octocat/hello-world`.
    pub fn repo_url(&self) -> String {
        format!("https://{}", self.key())
    }

    /// Documentation page URL under `base_url`.
    pub fn page_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.key())
    }

    /// Search page URL used to request indexing.
    pub fn search_url(&self, base_url: &str) -> String {
        let mut url = format!("{}/search", base_url.trim_end_matches('/'));
        if let Ok(mut parsed) = Url::parse(&url) {
            parsed.query_pairs_mut().append_pair("q", &self.slug());
            url = parsed.into();
        }
        url
    }
}

impl fmt::Display for RepoLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repo_url())
    }
}

fn invalid(input: &str) -> Error {
    Error::Validation(format!(
        "Invalid repository URL: '{input}'. Expected https://github.com/owner/repo or owner/repo shorthand."
    ))
}
