//! `read_structure`: the wiki's table of contents as JSON

use codewiki_core::{Error, WikiClient};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::locate;
use crate::envelope::ToolResponse;

/// Parameters for the `read_structure` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReadStructureParams {
    /// Repository URL (e.g. `https://github.com/microsoft/vscode`) or `owner/repo` shorthand
    #[serde(default)]
    pub repo_url: String,
}

/// Handle `read_structure`.
///
/// `data` is an ordered array of `{title, anchor, depth, preview}`; the
/// anchors are accepted as `section_title` by `read_contents`.
#[tracing::instrument(skip(client))]
pub async fn handle_read_structure(client: &WikiClient, params: ReadStructureParams) -> ToolResponse {
    let locator = match locate(&params.repo_url) {
        Ok(locator) => locator,
        Err(response) => return response,
    };
    let preview_chars = client.config().response.preview_chars;

    let attempted = client.page(&locator).await.and_then(|page| {
        let toc = serde_json::to_value(page.toc(preview_chars)).map_err(Error::from)?;
        Ok((page.title, page.sections.len(), toc))
    });
    ToolResponse::from_attempted(attempted, |(title, count, toc)| {
        ToolResponse::ok(toc).with_message(format!("{title}: {count} sections"))
    })
    .with_repo(locator.repo_url())
}
