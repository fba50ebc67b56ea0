//! Indexing requests for repositories the wiki does not know yet.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{Config, RepoLocator, Result};

const REQUEST_BUTTON: &str = "Request repository";
const SUBMIT_BUTTON: &str = "Submit";
const CONFIRMATION_PHRASES: &[&str] = &["repo requested", "we'll review", "we will review"];

/// The search page's request-indexing controls.
#[async_trait(?Send)]
pub trait IndexingSurface {
    /// Wait up to `timeout` for a visible button labelled `label`.
    async fn wait_for_button(&mut self, label: &str, timeout: Duration) -> Result<bool>;

    /// Whether the button labelled `label` exists and is enabled.
    async fn button_enabled(&mut self, label: &str) -> Result<bool>;

    /// Click the button labelled `label`. `false` if it is missing or disabled.
    async fn click_button(&mut self, label: &str) -> Result<bool>;

    /// Type `value` into the URL field of the request dialog.
    async fn fill_url_input(&mut self, value: &str, timeout: Duration) -> Result<bool>;

    /// Visible text of the whole page.
    async fn body_text(&mut self) -> Result<String>;
}

/// Pacing for the request flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexingTiming {
    /// Budget for the request button to appear.
    pub button_wait: Duration,
    /// Budget for the dialog's URL field.
    pub input_wait: Duration,
    /// Checks of the submit button before giving up.
    pub enable_checks: u32,
    /// Gap between those checks.
    pub enable_interval: Duration,
    /// Pause after submitting before reading the confirmation.
    pub confirm_delay: Duration,
}

impl Default for IndexingTiming {
    fn default() -> Self {
        Self {
            button_wait: Duration::from_secs(10),
            input_wait: Duration::from_secs(5),
            enable_checks: 10,
            enable_interval: Duration::from_millis(300),
            confirm_delay: Duration::from_secs(2),
        }
    }
}

impl IndexingTiming {
    /// Timings for `config`; the button wait never exceeds the element wait.
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            button_wait: defaults.button_wait.min(config.element_wait_timeout()),
            ..defaults
        }
    }
}

/// How far the request flow got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingOutcome {
    /// Submitted and the page confirmed it.
    Confirmed,
    /// Submitted; no confirmation text was found.
    Unconfirmed,
    /// The request button never appeared.
    ButtonMissing,
    /// The dialog opened without a URL field.
    InputMissing,
    /// The submit button stayed disabled.
    SubmitFailed,
}

impl IndexingOutcome {
    /// Whether the request reached the site.
    pub const fn submitted(self) -> bool {
        matches!(self, Self::Confirmed | Self::Unconfirmed)
    }

    /// Human-readable result, with manual steps when automation fell short.
    pub fn message(self, locator: &RepoLocator, base_url: &str) -> String {
        let repo = locator.repo_url();
        let search = locator.search_url(base_url);
        match self {
            Self::Confirmed => format!(
                "Indexing requested for {repo}. The site confirmed the request; \
                 indexing usually takes a while. Retry read_structure later."
            ),
            Self::Unconfirmed => format!(
                "Indexing request submitted for {repo}, but no confirmation was shown. \
                 Check {search} to verify."
            ),
            Self::ButtonMissing => format!(
                "Could not find the \"{REQUEST_BUTTON}\" button. The repository may already be \
                 indexed or queued. To request it manually:\n\
                 1. Open {search}\n\
                 2. Click \"{REQUEST_BUTTON}\"\n\
                 3. Enter {repo}\n\
                 4. Click \"{SUBMIT_BUTTON}\""
            ),
            Self::InputMissing | Self::SubmitFailed => format!(
                "The request dialog did not accept the repository URL. To request it manually:\n\
                 1. Open {search}\n\
                 2. Click \"{REQUEST_BUTTON}\"\n\
                 3. Enter {repo}\n\
                 4. Click \"{SUBMIT_BUTTON}\""
            ),
        }
    }
}

/// Walk the request dialog for `locator` on an already-open search page.
pub async fn request_indexing<S>(
    surface: &mut S,
    locator: &RepoLocator,
    timing: IndexingTiming,
) -> Result<IndexingOutcome>
where
    S: IndexingSurface + ?Sized,
{
    if !surface.wait_for_button(REQUEST_BUTTON, timing.button_wait).await?
        || !surface.click_button(REQUEST_BUTTON).await?
    {
        warn!(repo = %locator, "request button not found");
        return Ok(IndexingOutcome::ButtonMissing);
    }
    debug!("request dialog opened");

    if !surface.fill_url_input(&locator.repo_url(), timing.input_wait).await? {
        warn!(repo = %locator, "request dialog has no URL field");
        return Ok(IndexingOutcome::InputMissing);
    }

    let mut enabled = false;
    for _ in 0..timing.enable_checks {
        if surface.button_enabled(SUBMIT_BUTTON).await? {
            enabled = true;
            break;
        }
        tokio::time::sleep(timing.enable_interval).await;
    }
    if !enabled || !surface.click_button(SUBMIT_BUTTON).await? {
        warn!(repo = %locator, "submit button stayed disabled");
        return Ok(IndexingOutcome::SubmitFailed);
    }

    tokio::time::sleep(timing.confirm_delay).await;
    let body = surface.body_text().await?.to_lowercase();
    let outcome = if CONFIRMATION_PHRASES.iter().any(|p| body.contains(p)) {
        IndexingOutcome::Confirmed
    } else {
        IndexingOutcome::Unconfirmed
    };
    info!(repo = %locator, ?outcome, "indexing request finished");
    Ok(outcome)
}
