//! Uniform response envelope returned by every tool
//!
//! Success and failure share one shape so callers can branch on `status`
//! and read `meta` either way:
//!
//! ```json
//! {
//!   "status": "error",
//!   "code": "NOT_INDEXED",
//!   "message": "...",
//!   "repo_url": "https://github.com/octocat/hello-world",
//!   "meta": { "elapsed_ms": 812, "char_count": 0, "attempt": 1, "max_attempts": 2, "truncated": false }
//! }
//! ```

use std::time::Instant;

use codewiki_core::{Attempted, Error, ErrorCode};
use rmcp::model::{CallToolResult, Content};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::McpResult;

/// Outcome of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The call produced data.
    Ok,
    /// The call failed; see `code` and `message`.
    Error,
}

/// Timing, size and retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Wall-clock time spent in the handler.
    pub elapsed_ms: u64,
    /// Characters in `data` when it is text; serialized length otherwise.
    pub char_count: usize,
    /// Attempts made.
    pub attempt: u32,
    /// Attempts allowed.
    pub max_attempts: u32,
    /// Whether `data` was cut to fit the response cap.
    pub truncated: bool,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            elapsed_ms: 0,
            char_count: 0,
            attempt: 1,
            max_attempts: 1,
            truncated: false,
        }
    }
}

/// Tool response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// `ok` or `error`.
    pub status: Status,
    /// Error code, only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Payload, only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Canonical repository URL, once the input parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    /// Question or section the caller asked for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Bookkeeping.
    #[serde(default)]
    pub meta: Meta,
}

impl ToolResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        let char_count = match &data {
            Value::String(text) => text.chars().count(),
            other => other.to_string().chars().count(),
        };
        Self {
            status: Status::Ok,
            code: None,
            message: None,
            data: Some(data),
            repo_url: None,
            query: None,
            meta: Meta {
                char_count,
                ..Meta::default()
            },
        }
    }

    /// Successful text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self::ok(Value::String(text.into()))
    }

    /// Failure response for `err`.
    ///
    /// Only the public message crosses the boundary; internal detail is
    /// logged here and dropped.
    pub fn failure(err: &Error) -> Self {
        let code = err.code();
        if code == ErrorCode::Internal {
            tracing::error!(category = err.category(), "internal failure: {err}");
        } else {
            tracing::warn!(code = %code, "tool call failed: {err}");
        }
        Self {
            status: Status::Error,
            code: Some(code),
            message: Some(err.public_message()),
            data: None,
            repo_url: None,
            query: None,
            meta: Meta::default(),
        }
    }

    /// Envelope for an orchestrated call, building `data` from the success
    /// value with `build`.
    pub fn from_attempted<T>(attempted: Attempted<T>, build: impl FnOnce(T) -> Self) -> Self {
        let (attempt, max_attempts) = (attempted.attempt, attempted.max_attempts);
        let response = match attempted.result {
            Ok(value) => build(value),
            Err(err) => Self::failure(&err),
        };
        response.with_attempts(attempt, max_attempts)
    }

    /// Attach the canonical repository URL.
    #[must_use]
    pub fn with_repo(mut self, repo_url: impl Into<String>) -> Self {
        self.repo_url = Some(repo_url.into());
        self
    }

    /// Attach the caller's query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Attach a message alongside the data.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Record attempt counts.
    #[must_use]
    pub const fn with_attempts(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.meta.attempt = attempt;
        self.meta.max_attempts = max_attempts;
        self
    }

    /// Record whether `data` was cut.
    #[must_use]
    pub const fn with_truncated(mut self, truncated: bool) -> Self {
        self.meta.truncated = truncated;
        self
    }

    /// Stamp the time elapsed since `started`.
    #[must_use]
    pub fn finish(mut self, started: Instant) -> Self {
        self.meta.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// `data` as text, when it is text.
    pub fn data_text(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }

    /// Pretty JSON for the MCP transport.
    pub fn to_json(&self) -> McpResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Wrap as an MCP tool result. Failures set the result's error flag but
    /// still carry the full envelope.
    pub fn into_call_result(self) -> McpResult<CallToolResult> {
        let content = vec![Content::text(self.to_json()?)];
        Ok(if self.is_ok() {
            CallToolResult::success(content)
        } else {
            CallToolResult::error(content)
        })
    }
}
