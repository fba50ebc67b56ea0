//! # codewiki-core
//!
//! Fetch, cache, and parse pipeline for CodeWiki, the service that publishes
//! generated documentation for public source repositories.
//!
//! The pages are client-rendered, so every read goes through one shared
//! headless browser. Renders are cached for a short time, parsed into
//! sections and diagrams, and served as markdown views.
//!
//! ## Architecture
//!
//! - **Locator**: normalizes `owner/repo`, forge URLs, and page URLs into one key
//! - **Browser**: a single Chromium process driven from a dedicated thread
//! - **Cache**: bounded TTL cache with separate namespaces for renders and views
//! - **Parser**: pluggable section strategies plus diagram extraction
//! - **Chat**: debounce state machine that waits for a streamed answer to settle
//! - **Retry**: fixed-delay retries inside a hard deadline
//! - **Wiki**: the client tool handlers call
//!
//! ## Quick Start
//!
//! ```rust
//! use codewiki_core::{Parser, RepoLocator};
//!
//! let locator = RepoLocator::parse("https://github.com/octocat/Hello-World")?;
//! assert_eq!(locator.key(), "github.com/octocat/hello-world");
//!
//! let html = "<html><body><main><h2>Overview</h2><p>Hi.</p></main></body></html>";
//! let page = Parser::default().parse(html, locator.name())?;
//! assert_eq!(page.sections[0].title, "Overview");
//! # Ok::<(), codewiki_core::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns [`Result<T, Error>`]. [`Error::code`] maps a
//! failure onto the closed [`ErrorCode`] set, and [`Error::is_recoverable`]
//! tells the retry policy whether another attempt makes sense.

/// Shared headless-browser session
pub mod browser;
/// Bounded TTL page cache
pub mod cache;
/// Chat automation state machine
pub mod chat;
/// Layered configuration
pub mod config;
/// Error types and result aliases
pub mod error;
/// Indexing request flow
pub mod indexing;
/// Repository identifier normalization
pub mod locator;
/// Section and diagram extraction
pub mod parser;
/// Markdown views and truncation
pub mod render;
/// Retry and deadline orchestration
pub mod retry;
/// Cached wiki client
pub mod wiki;

pub use browser::{BrowserSession, InteractivePage, LaunchSettings, RenderedPage, WaitStrategy};
pub use cache::{CacheKey, CacheStats, Namespace, PageCache, TtlCache};
pub use chat::{ChatAnswer, ChatSequencer, ChatState, ChatSurface, ChatTiming, Debounce, Verdict};
pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use indexing::{IndexingOutcome, IndexingSurface, IndexingTiming};
pub use locator::RepoLocator;
pub use parser::{Diagram, DiagramKind, Parser, Section, TocEntry, WikiPage};
pub use render::Window;
pub use retry::{AttemptLog, Attempted, Deadline, Orchestrator, RetryPolicy};
pub use wiki::{BrowserBackend, WikiBackend, WikiClient};
