//! MCP server implementation for CodeWiki

use std::sync::Arc;
use std::time::Instant;

use codewiki_core::WikiClient;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{ErrorData, ServerHandler, tool, tool_handler, tool_router};

use crate::envelope::ToolResponse;
use crate::error::{McpError, McpResult};
use crate::tools::{
    ListTopicsParams, ReadContentsParams, ReadStructureParams, RequestIndexingParams,
    SearchWikiParams, handle_list_topics, handle_read_contents, handle_read_structure,
    handle_request_indexing, handle_search_wiki,
};

const INSTRUCTIONS: &str = "Read Google CodeWiki documentation for public repositories. \
    Start with read_structure to see the sections, then read_contents with a section title or \
    anchor. list_topics gives a readable overview, search_wiki asks the repository's chat \
    assistant, and request_indexing asks CodeWiki to generate a wiki when a repository reports \
    NOT_INDEXED. Every tool returns a JSON envelope with status, code, message, data and meta.";

/// MCP server for CodeWiki
#[derive(Clone)]
pub struct CodeWikiServer {
    client: Arc<WikiClient>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CodeWikiServer {
    /// Create a server over `client`
    pub fn new(client: Arc<WikiClient>) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
        }
    }

    /// Shared wiki client
    pub fn client(&self) -> &WikiClient {
        &self.client
    }

    /// Serve the MCP protocol over stdio until the peer disconnects
    pub async fn serve_stdio(&self) -> McpResult<()> {
        tracing::info!("CodeWiki MCP server starting");

        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();

        let service = rmcp::serve_server(self.clone(), (stdin, stdout))
            .await
            .map_err(|e| {
                tracing::error!("server initialization error: {}", e);
                McpError::Protocol(e.to_string())
            })?;

        service.waiting().await.map_err(|e| {
            tracing::error!("server runtime error: {}", e);
            McpError::Protocol(e.to_string())
        })?;

        tracing::info!("CodeWiki MCP server stopped");
        Ok(())
    }

    #[tool(
        description = "List the documentation topics of a repository as a numbered markdown \
                       overview with short previews. Accepts https://github.com/owner/repo or \
                       owner/repo."
    )]
    async fn list_topics(
        &self,
        params: Parameters<ListTopicsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        reply(handle_list_topics(&self.client, params.0).await, started)
    }

    #[tool(
        description = "Get the table of contents of a repository wiki as a JSON list of \
                       {title, anchor, depth, preview}. Use the titles or anchors with \
                       read_contents."
    )]
    async fn read_structure(
        &self,
        params: Parameters<ReadStructureParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        reply(handle_read_structure(&self.client, params.0).await, started)
    }

    #[tool(
        description = "Read a repository wiki as markdown: the whole page, or one section and \
                       its subsections when section_title is given. Long text is returned in \
                       windows; pass the offset named in the footer to continue."
    )]
    async fn read_contents(
        &self,
        params: Parameters<ReadContentsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        reply(handle_read_contents(&self.client, params.0).await, started)
    }

    #[tool(
        description = "Ask a natural-language question about a repository. The question goes to \
                       CodeWiki's chat assistant and the settled answer is returned. Slow: \
                       expect tens of seconds."
    )]
    async fn search_wiki(
        &self,
        params: Parameters<SearchWikiParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        reply(handle_search_wiki(&self.client, params.0).await, started)
    }

    #[tool(
        description = "Ask CodeWiki to generate documentation for a repository that is not \
                       indexed yet. Submits the request once and returns confirmation or \
                       manual steps."
    )]
    async fn request_indexing(
        &self,
        params: Parameters<RequestIndexingParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let started = Instant::now();
        reply(handle_request_indexing(&self.client, params.0).await, started)
    }
}

fn reply(response: ToolResponse, started: Instant) -> Result<CallToolResult, ErrorData> {
    let response = response.finish(started);
    tracing::debug!(
        status = ?response.status,
        elapsed_ms = response.meta.elapsed_ms,
        attempt = response.meta.attempt,
        "tool call finished"
    );
    response.into_call_result().map_err(ErrorData::from)
}

#[tool_handler]
impl ServerHandler for CodeWikiServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "codewiki-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}
