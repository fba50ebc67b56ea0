//! Tool implementations for the CodeWiki MCP server
//!
//! Each tool validates its input before touching the network, runs through
//! the shared [`WikiClient`](codewiki_core::WikiClient), and always answers
//! with a [`ToolResponse`] envelope.

pub mod contents;
pub mod indexing;
pub mod search;
pub mod structure;
pub mod topics;

pub use contents::{ReadContentsParams, handle_read_contents};
pub use indexing::{RequestIndexingParams, handle_request_indexing};
pub use search::{SearchWikiParams, handle_search_wiki};
pub use structure::{ReadStructureParams, handle_read_structure};
pub use topics::{ListTopicsParams, handle_list_topics};

use codewiki_core::render::truncate;
use codewiki_core::{Error, RepoLocator};

use crate::envelope::ToolResponse;

/// Parse `repo_url`, or the VALIDATION envelope to return instead.
pub(crate) fn locate(repo_url: &str) -> Result<RepoLocator, ToolResponse> {
    RepoLocator::parse(repo_url).map_err(|err| ToolResponse::failure(&err))
}

/// Reject blank free-text fields.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), ToolResponse> {
    if value.trim().is_empty() {
        return Err(ToolResponse::failure(&Error::Validation(format!(
            "{field} must not be blank"
        ))));
    }
    Ok(())
}

/// Text envelope cut to `max_chars`.
pub(crate) fn capped_text(text: &str, max_chars: usize) -> ToolResponse {
    let (text, cut) = truncate(text, max_chars);
    ToolResponse::text(text).with_truncated(cut)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use codewiki_core::ErrorCode;

    #[test]
    fn test_locate_rejects_garbage_without_io() {
        let response = locate("not a repo").unwrap_err();
        assert_eq!(response.code, Some(ErrorCode::Validation));
        assert_eq!(response.meta.attempt, 1);

        let response = locate("").unwrap_err();
        assert_eq!(response.message.as_deref(), Some("repo_url must not be empty"));
    }

    #[test]
    fn test_require_text_names_the_field() {
        let response = require_text("query", "   ").unwrap_err();
        assert_eq!(response.message.as_deref(), Some("query must not be blank"));
        assert!(require_text("query", "why").is_ok());
    }

    #[test]
    fn test_capped_text_marks_truncation() {
        let response = capped_text(&"word ".repeat(100), 50);
        assert!(response.meta.truncated);
        assert!(response.data_text().unwrap().ends_with("... [truncated]"));

        let response = capped_text("short", 50);
        assert!(!response.meta.truncated);
    }
}
