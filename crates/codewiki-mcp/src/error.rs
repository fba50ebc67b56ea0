//! Error types for the CodeWiki MCP server
//!
//! Tool failures are reported inside the response envelope and never reach
//! this type. [`McpError`] covers the server itself: startup, transport and
//! serialization of envelopes.

use thiserror::Error;

/// Errors that can occur in the MCP server
#[derive(Debug, Error)]
pub enum McpError {
    /// Core pipeline failure outside a tool call (configuration, browser launch)
    #[error("core error: {0}")]
    Core(#[from] codewiki_core::Error),

    /// JSON serialization/deserialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<McpError> for rmcp::ErrorData {
    fn from(err: McpError) -> Self {
        Self::internal_error(err.to_string(), None)
    }
}

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_to_rmcp_internal_error() {
        let data: rmcp::ErrorData = McpError::Protocol("stdin closed".into()).into();
        assert_eq!(data.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
        assert!(data.message.contains("stdin closed"));

        let core = McpError::from(codewiki_core::Error::Config("zero attempts".into()));
        let data: rmcp::ErrorData = core.into();
        assert_eq!(data.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn test_envelope_serialization_failure_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = McpError::from(json_err);
        assert!(err.to_string().starts_with("json error"));
    }
}
