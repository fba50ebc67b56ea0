//! `list_topics`: numbered topic overview of a repository wiki

use codewiki_core::WikiClient;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{capped_text, locate};
use crate::envelope::ToolResponse;

/// Parameters for the `list_topics` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListTopicsParams {
    /// Repository URL (e.g. `https://github.com/microsoft/vscode`) or `owner/repo` shorthand
    #[serde(default)]
    pub repo_url: String,
}

/// Handle `list_topics`.
#[tracing::instrument(skip(client))]
pub async fn handle_list_topics(client: &WikiClient, params: ListTopicsParams) -> ToolResponse {
    let locator = match locate(&params.repo_url) {
        Ok(locator) => locator,
        Err(response) => return response,
    };
    let max_chars = client.config().response.max_chars;

    ToolResponse::from_attempted(client.topics(&locator).await, |text| {
        capped_text(&text, max_chars)
    })
    .with_repo(locator.repo_url())
}
