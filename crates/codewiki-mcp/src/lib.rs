//! CodeWiki MCP Server
//!
//! Exposes Google CodeWiki's generated repository documentation to MCP
//! clients over stdio. Five tools sit on top of
//! [`codewiki_core::WikiClient`]:
//!
//! | Tool | Returns |
//! |---|---|
//! | `list_topics` | numbered markdown overview |
//! | `read_structure` | JSON table of contents |
//! | `read_contents` | page or section markdown, paginated |
//! | `search_wiki` | chat assistant answer |
//! | `request_indexing` | confirmation or manual steps |
//!
//! Every tool answers with a [`ToolResponse`] envelope, including on failure.

pub mod cli;
pub mod envelope;
pub mod error;
pub mod server;
pub mod tools;

use std::sync::Arc;

use codewiki_core::WikiClient;
use tracing_subscriber::EnvFilter;

pub use cli::Cli;
pub use envelope::{Meta, Status, ToolResponse};
pub use error::{McpError, McpResult};
pub use server::CodeWikiServer;

/// Install the stderr log subscriber. stdout carries the protocol.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}

/// Serve `client` over stdio until the peer disconnects.
///
/// # Errors
///
/// Returns an error if the server fails to initialize or run.
pub async fn serve_stdio(client: Arc<WikiClient>) -> McpResult<()> {
    tracing::debug!("initializing CodeWiki MCP server");
    CodeWikiServer::new(client).serve_stdio().await
}
