//! `search_wiki`: ask the repository's chat assistant

use codewiki_core::WikiClient;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{capped_text, locate, require_text};
use crate::envelope::ToolResponse;

/// Note attached to answers that never settled.
const PARTIAL_NOTE: &str =
    "The answer was still changing when the wait ran out and may be incomplete.";

/// Parameters for the `search_wiki` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchWikiParams {
    /// Repository URL (e.g. `https://github.com/microsoft/vscode`) or `owner/repo` shorthand
    #[serde(default)]
    pub repo_url: String,

    /// Question to ask about the repository
    #[serde(default)]
    pub query: String,
}

/// Handle `search_wiki`.
#[tracing::instrument(skip(client))]
pub async fn handle_search_wiki(client: &WikiClient, params: SearchWikiParams) -> ToolResponse {
    let locator = match locate(&params.repo_url) {
        Ok(locator) => locator,
        Err(response) => return response.with_query(params.query),
    };
    if let Err(response) = require_text("query", &params.query) {
        return response.with_repo(locator.repo_url()).with_query(params.query);
    }
    let max_chars = client.config().response.max_chars;

    ToolResponse::from_attempted(client.ask(&locator, params.query.trim()).await, |answer| {
        let response = capped_text(&answer.text, max_chars);
        if answer.partial {
            response.with_truncated(true).with_message(PARTIAL_NOTE)
        } else {
            response
        }
    })
    .with_repo(locator.repo_url())
    .with_query(params.query)
}
