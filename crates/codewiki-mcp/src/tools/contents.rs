//! `read_contents`: whole page or one section as markdown, in windows

use codewiki_core::render::{paginate, sections_markdown};
use codewiki_core::{Error, WikiClient};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{locate, require_text};
use crate::envelope::ToolResponse;

/// Parameters for the `read_contents` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReadContentsParams {
    /// Repository URL (e.g. `https://github.com/microsoft/vscode`) or `owner/repo` shorthand
    #[serde(default)]
    pub repo_url: String,

    /// Title (or part of one) or anchor of a section; omit for the whole page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,

    /// Character offset to start from (default 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,

    /// Maximum characters to return (default and ceiling: the response cap)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Handle `read_contents`.
///
/// A section lookup returns the section together with its subsections.
/// Text longer than the window ends with a footer naming the next offset.
#[tracing::instrument(skip(client))]
pub async fn handle_read_contents(client: &WikiClient, params: ReadContentsParams) -> ToolResponse {
    let locator = match locate(&params.repo_url) {
        Ok(locator) => locator,
        Err(response) => return response,
    };
    if let Some(section) = &params.section_title {
        if let Err(response) = require_text("section_title", section) {
            return response.with_repo(locator.repo_url()).with_query(section.clone());
        }
    }
    let max_chars = client.config().response.max_chars;
    let limit = match params.limit {
        Some(0) => {
            return ToolResponse::failure(&Error::Validation("limit must be at least 1".into()))
                .with_repo(locator.repo_url());
        },
        Some(limit) => limit.min(max_chars),
        None => max_chars,
    };
    let offset = params.offset.unwrap_or(0);

    let attempted = match &params.section_title {
        Some(section) => client.page(&locator).await.and_then(|page| {
            let index = page.find_section(section)?;
            Ok(sections_markdown(page.section_with_children(index)))
        }),
        None => client.contents(&locator).await.map(|text| text.to_string()),
    };

    let response = ToolResponse::from_attempted(attempted, |text| {
        let window = paginate(&text, offset, limit);
        let truncated = window.truncated();
        ToolResponse::text(window.text).with_truncated(truncated)
    })
    .with_repo(locator.repo_url());
    match params.section_title {
        Some(section) => response.with_query(section),
        None => response,
    }
}
