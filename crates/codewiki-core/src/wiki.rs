//! Cached, retried access to wiki pages.
//!
//! [`WikiClient`] is what tool handlers talk to. It owns the page cache and
//! funnels every upstream call through the [`Orchestrator`]. The browser sits
//! behind the [`WikiBackend`] trait so the pipeline can be exercised against
//! canned HTML.
//!
//! Concurrent requests for the same uncached repository share one render:
//! the first caller takes a per-key gate, later callers wait on it and then
//! find the page in the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::browser::{BrowserSession, RenderedPage, WaitStrategy};
use crate::cache::{CacheStats, PageCache};
use crate::chat::{ChatAnswer, ChatSequencer, ChatTiming};
use crate::indexing::{self, IndexingOutcome, IndexingTiming};
use crate::parser::{Parser, WikiPage};
use crate::render::{page_markdown, topics_markdown};
use crate::retry::{Attempted, Orchestrator};
use crate::{Config, RepoLocator, Result};

/// Derived-view name of the topic list.
pub const TOPICS_VIEW: &str = "topics";
/// Derived-view name of the full-page markdown.
pub const CONTENTS_VIEW: &str = "contents";

/// Upstream operations the client needs.
#[async_trait]
pub trait WikiBackend: Send + Sync {
    /// Render `url` and return its HTML.
    async fn render(&self, url: &str) -> Result<RenderedPage>;

    /// Ask `question` in the chat panel of `url`.
    async fn ask(&self, url: &str, question: &str) -> Result<ChatAnswer>;

    /// Walk the request dialog on `search_url` for `locator`.
    async fn request_indexing(&self, search_url: &str, locator: &RepoLocator) -> Result<IndexingOutcome>;
}

/// [`WikiBackend`] driving the shared headless browser.
pub struct BrowserBackend {
    session: Arc<BrowserSession>,
    wait: WaitStrategy,
    chat: ChatTiming,
    indexing: IndexingTiming,
}

impl BrowserBackend {
    /// Backend over `session` with timings from `config`.
    pub fn new(session: Arc<BrowserSession>, config: &Config) -> Self {
        Self {
            session,
            wait: WaitStrategy::from_config(config),
            chat: ChatTiming::from_config(config),
            indexing: IndexingTiming::from_config(config),
        }
    }
}

#[async_trait]
impl WikiBackend for BrowserBackend {
    async fn render(&self, url: &str) -> Result<RenderedPage> {
        self.session.render_url(url, &self.wait).await
    }

    async fn ask(&self, url: &str, question: &str) -> Result<ChatAnswer> {
        let question = question.to_string();
        let timing = self.chat;
        self.session
            .with_interactive_page(url, &self.wait, move |page| {
                Box::pin(async move { ChatSequencer::new(timing).ask(page, &question).await })
            })
            .await
    }

    async fn request_indexing(&self, search_url: &str, locator: &RepoLocator) -> Result<IndexingOutcome> {
        let locator = locator.clone();
        let timing = self.indexing;
        self.session
            .with_interactive_page(search_url, &self.wait, move |page| {
                Box::pin(async move { indexing::request_indexing(page, &locator, timing).await })
            })
            .await
    }
}

type InflightTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// One caller's claim on a key's render gate.
///
/// Dropping it, including when the caller's future is cancelled mid-render,
/// removes the key once no other caller holds the gate.
struct InflightSlot<'a> {
    table: &'a InflightTable,
    key: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut inflight = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Map plus this handle: nobody else is waiting.
        if Arc::strong_count(&self.gate) <= 2 {
            inflight.remove(&self.key);
        }
    }
}

/// Entry point for tool handlers.
pub struct WikiClient {
    config: Config,
    backend: Arc<dyn WikiBackend>,
    cache: PageCache,
    parser: Parser,
    orchestrator: Orchestrator,
    inflight: InflightTable,
}

impl WikiClient {
    /// Client over `backend`, sized and timed by `config`.
    pub fn new(config: Config, backend: Arc<dyn WikiBackend>) -> Self {
        Self {
            cache: PageCache::new(config.cache.max_size, config.cache_ttl()),
            orchestrator: Orchestrator::from_config(&config),
            parser: Parser::default(),
            inflight: Mutex::new(HashMap::new()),
            backend,
            config,
        }
    }

    /// Active configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Counters for the rendered and derived namespaces.
    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        self.cache.stats()
    }

    fn max_attempts(&self) -> u32 {
        self.orchestrator.retry.max_attempts
    }

    fn slot(&self, key: String) -> InflightSlot<'_> {
        let gate = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(inflight.entry(key.clone()).or_default())
        };
        InflightSlot {
            table: &self.inflight,
            key,
            gate,
        }
    }

    fn parse_cached(&self, locator: &RepoLocator) -> Option<Attempted<WikiPage>> {
        let rendered = self.cache.page(locator)?;
        Some(
            Attempted::immediate((), self.max_attempts())
                .and_then(|()| self.parser.parse(&rendered.html, locator.name())),
        )
    }

    /// Parsed page for `locator`, rendering it if it is not cached.
    #[tracing::instrument(skip(self), fields(repo = %locator.key()))]
    pub async fn page(&self, locator: &RepoLocator) -> Attempted<WikiPage> {
        if let Some(hit) = self.parse_cached(locator) {
            debug!("serving cached render");
            return hit;
        }

        let slot = self.slot(locator.key());
        let _held = slot.gate.lock().await;
        if let Some(hit) = self.parse_cached(locator) {
            debug!("render finished by a concurrent caller");
            return hit;
        }

        let url = locator.page_url(&self.config.base_url);
        let (url, name) = (url.as_str(), locator.name());
        let (backend, parser) = (&self.backend, &self.parser);
        let attempted = self
            .orchestrator
            .run(|attempt| async move {
                debug!(attempt, url, "rendering page");
                let rendered = backend.render(url).await?;
                let page = parser.parse(&rendered.html, name)?;
                Ok((rendered, page))
            })
            .await;

        let attempted = attempted.map(|(rendered, page)| {
            info!(sections = page.sections.len(), chars = rendered.html.len(), "page rendered");
            self.cache.store_page(locator, Arc::new(rendered));
            page
        });
        attempted
    }

    /// Cached text view `name` of `locator`, built from the parsed page on a
    /// miss.
    pub async fn view<F>(&self, locator: &RepoLocator, name: &str, build: F) -> Attempted<Arc<str>>
    where
        F: FnOnce(&WikiPage) -> String + Send,
    {
        if let Some(hit) = self.cache.view(locator, name) {
            return Attempted::immediate(hit, self.max_attempts());
        }
        self.page(locator).await.map(|page| {
            let text: Arc<str> = Arc::from(build(&page));
            self.cache.store_view(locator, name, Arc::clone(&text));
            text
        })
    }

    /// Topic list of `locator`.
    pub async fn topics(&self, locator: &RepoLocator) -> Attempted<Arc<str>> {
        let preview = self.config.response.preview_chars;
        self.view(locator, TOPICS_VIEW, move |page| topics_markdown(page, preview))
            .await
    }

    /// Whole page of `locator` as markdown.
    pub async fn contents(&self, locator: &RepoLocator) -> Attempted<Arc<str>> {
        self.view(locator, CONTENTS_VIEW, page_markdown).await
    }

    /// Ask the repository's chat. Never cached.
    #[tracing::instrument(skip(self, question), fields(repo = %locator.key()))]
    pub async fn ask(&self, locator: &RepoLocator, question: &str) -> Attempted<ChatAnswer> {
        let url = locator.page_url(&self.config.base_url);
        let (url, backend) = (url.as_str(), &self.backend);
        self.orchestrator
            .run(|attempt| async move {
                debug!(attempt, "asking chat");
                backend.ask(url, question).await
            })
            .await
    }

    /// Submit an indexing request. Runs once: the request has side effects.
    #[tracing::instrument(skip(self), fields(repo = %locator.key()))]
    pub async fn request_indexing(&self, locator: &RepoLocator) -> Attempted<IndexingOutcome> {
        let url = locator.search_url(&self.config.base_url);
        let (url, backend) = (url.as_str(), &self.backend);
        self.orchestrator
            .single_attempt()
            .run(|_| backend.request_indexing(url, locator))
            .await
    }
}
