//! Browser lifecycle on the dedicated browser thread.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::WaitStrategy;
use crate::config::USER_AGENT;
use crate::{Config, Error, Result};

const MARKER_POLL: Duration = Duration::from_millis(250);

/// Options used when the browser is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Explicit executable; auto-detected when `None`.
    pub chrome_path: Option<PathBuf>,
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// User agent string.
    pub user_agent: String,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            width: 1920,
            height: 1080,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl LaunchSettings {
    /// Settings derived from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chrome_path: config.browser.chrome_path.clone(),
            ..Self::default()
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg(format!("--user-agent={}", self.user_agent))
            .window_size(self.width, self.height);
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| Error::Driver(format!("invalid browser configuration: {e}")))
    }
}

struct Launched {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Owns the browser process. Lives on the browser thread only.
pub(crate) struct Engine {
    settings: LaunchSettings,
    state: Mutex<Option<Launched>>,
    pages: RefCell<HashMap<u64, Page>>,
    next_page: Cell<u64>,
}

impl Engine {
    pub(crate) fn new(settings: LaunchSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(None),
            pages: RefCell::new(HashMap::new()),
            next_page: Cell::new(0),
        }
    }

    /// Launch on first call; relaunch if the CDP connection has died.
    async fn launched(&self) -> Result<MutexGuard<'_, Option<Launched>>> {
        let mut state = self.state.lock().await;

        if state.as_ref().is_some_and(|l| l.handler.is_finished()) {
            warn!("browser connection lost; relaunching");
            state.take();
        }

        if state.is_none() {
            info!("launching headless browser");
            let config = self.settings.browser_config()?;
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| Error::Driver(format!("failed to launch browser: {e}")))?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        debug!("CDP handler loop ended");
                        break;
                    }
                }
            });
            *state = Some(Launched { browser, handler });
            info!("headless browser ready");
        }
        Ok(state)
    }

    pub(crate) async fn ensure_launched(&self) -> Result<()> {
        self.launched().await.map(drop)
    }

    /// Open `url` in a new tab and wait for it to render.
    ///
    /// Fails with [`Error::Timeout`] if navigation exceeds the page-load
    /// budget. A missing content marker is not an error: the settle delay is
    /// applied instead.
    pub(crate) async fn open_page(self: &Rc<Self>, url: &str, wait: &WaitStrategy) -> Result<PageGuard> {
        let page = {
            let state = self.launched().await?;
            let Some(launched) = state.as_ref() else {
                return Err(Error::Driver("browser not available".into()));
            };
            launched.browser.new_page("about:blank").await?
        };
        let guard = PageGuard::register(Rc::clone(self), page);

        let navigation = tokio::time::timeout(wait.page_load_timeout, guard.page().goto(url))
            .await
            .map(|nav| nav.map(drop));
        match navigation {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                guard.close().await;
                return Err(e.into());
            },
            Err(_) => {
                guard.close().await;
                return Err(Error::Timeout(format!(
                    "page load exceeded {}s for {url}",
                    wait.page_load_timeout.as_secs()
                )));
            },
        }

        if !wait_for_marker(guard.page(), wait).await {
            debug!(%url, "no content marker; applied settle delay");
        }
        Ok(guard)
    }

    fn track(&self, page: Page) -> u64 {
        let id = self.next_page.get();
        self.next_page.set(id + 1);
        self.pages.borrow_mut().insert(id, page);
        id
    }

    fn forget(&self, id: u64) {
        self.pages.borrow_mut().remove(&id);
    }

    /// Close tracked pages, then the browser.
    pub(crate) async fn shutdown(&self) {
        let pages: Vec<Page> = self.pages.borrow_mut().drain().map(|(_, p)| p).collect();
        for page in pages {
            if let Err(e) = page.close().await {
                debug!("failed to close page during shutdown: {e}");
            }
        }

        let launched = self.state.lock().await.take();
        if let Some(mut launched) = launched {
            if let Err(e) = launched.browser.close().await {
                warn!("error closing browser: {e}");
            }
            if let Err(e) = launched.browser.wait().await {
                debug!("error waiting for browser exit: {e}");
            }
            launched.handler.abort();
            info!("browser closed");
        }
    }
}

/// Poll for `wait.marker_selector`; fall back to the settle delay.
async fn wait_for_marker(page: &Page, wait: &WaitStrategy) -> bool {
    let deadline = Instant::now() + wait.marker_timeout;
    loop {
        if page.find_element(wait.marker_selector.as_str()).await.is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(MARKER_POLL).await;
    }
    tokio::time::sleep(wait.settle_delay).await;
    false
}

/// Open tab that is closed when the guard is closed or dropped.
pub(crate) struct PageGuard {
    engine: Rc<Engine>,
    id: u64,
    page: Page,
    open: bool,
}

impl PageGuard {
    fn register(engine: Rc<Engine>, page: Page) -> Self {
        let id = engine.track(page.clone());
        Self {
            engine,
            id,
            page,
            open: true,
        }
    }

    pub(crate) const fn page(&self) -> &Page {
        &self.page
    }

    pub(crate) async fn close(mut self) {
        self.open = false;
        self.engine.forget(self.id);
        if let Err(e) = self.page.clone().close().await {
            debug!("failed to close page: {e}");
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.engine.forget(self.id);
        // Abandoned mid-operation: close in the background.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let page = self.page.clone();
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!("failed to close abandoned page: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_settings_follow_config() {
        let mut config = Config::default();
        config.browser.chrome_path = Some(PathBuf::from("/opt/chrome/chrome"));
        let settings = LaunchSettings::from_config(&config);
        assert_eq!(settings.chrome_path.as_deref(), Some(std::path::Path::new("/opt/chrome/chrome")));
        assert_eq!((settings.width, settings.height), (1920, 1080));
        assert!(settings.user_agent.contains("Chrome/120"));
    }

    #[tokio::test]
    async fn test_shutdown_without_launch_is_noop() {
        let engine = Engine::new(LaunchSettings::default());
        engine.shutdown().await;
        assert!(engine.state.lock().await.is_none());
    }
}
