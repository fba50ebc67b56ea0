//! `request_indexing`: ask CodeWiki to generate a wiki for a repository

use codewiki_core::WikiClient;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::locate;
use crate::envelope::ToolResponse;

/// Parameters for the `request_indexing` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RequestIndexingParams {
    /// Repository URL (e.g. `https://github.com/microsoft/vscode`) or `owner/repo` shorthand
    #[serde(default)]
    pub repo_url: String,
}

/// Handle `request_indexing`.
///
/// Every outcome of the dialog, including the ones where automation gave
/// up, is `ok` with instructions in `data`; only driver failures and the
/// deadline produce errors.
#[tracing::instrument(skip(client))]
pub async fn handle_request_indexing(
    client: &WikiClient,
    params: RequestIndexingParams,
) -> ToolResponse {
    let locator = match locate(&params.repo_url) {
        Ok(locator) => locator,
        Err(response) => return response,
    };
    let base_url = client.config().base();

    ToolResponse::from_attempted(client.request_indexing(&locator).await, |outcome| {
        tracing::info!(?outcome, "indexing request finished");
        let response = ToolResponse::text(outcome.message(&locator, base_url));
        if outcome.submitted() {
            response.with_message("submitted")
        } else {
            response.with_message("not submitted; follow the manual steps")
        }
    })
    .with_repo(locator.repo_url())
}
