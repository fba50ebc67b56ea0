//! Shared headless-browser session.
//!
//! One Chromium process serves the whole server. It is launched on first use
//! and driven from a single dedicated thread that runs a current-thread Tokio
//! runtime inside a [`tokio::task::LocalSet`]. Callers on any thread submit
//! jobs over a channel and await a oneshot reply; jobs start in submission
//! order and interleave only at await points, so the CDP connection is never
//! driven from two threads at once.
//!
//! A caller that stops waiting (for example because its deadline fired) drops
//! its reply receiver. The worker notices, drops the in-flight job, and the
//! job's page guard closes the tab. The browser itself stays up.
//!
//! ```text
//!  tool task ──┐                         ┌── job 1 (render)
//!  tool task ──┼── mpsc<Command> ──▶ browser thread ── job 2 (chat)
//!  tool task ──┘        ▲                └── CDP handler task
//!                       └──── oneshot<Result<T>> ◀──┘
//! ```

mod engine;
mod page;

use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{Config, Error, Result};

pub(crate) use engine::Engine;
pub use engine::LaunchSettings;
pub use page::InteractivePage;

/// Elements whose presence means the SPA has rendered real content.
pub const CONTENT_MARKERS: &str = "h1, h2, h3, article, main, [class*='content']";

/// Extra settle time after markers appear, for late hydration.
const POST_RENDER_SETTLE: Duration = Duration::from_secs(1);

/// Immutable snapshot of a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPage {
    /// URL that was navigated to.
    pub url: String,
    /// Serialized DOM after rendering.
    pub html: String,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

impl RenderedPage {
    /// Snapshot taken now.
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
            captured_at: Utc::now(),
        }
    }
}

/// How a render decides the page is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitStrategy {
    /// CSS selector list; any match counts as rendered.
    pub marker_selector: String,
    /// Budget for the navigation itself.
    pub page_load_timeout: Duration,
    /// How long to poll for a marker.
    pub marker_timeout: Duration,
    /// Fixed delay used instead when no marker shows up.
    pub settle_delay: Duration,
}

impl WaitStrategy {
    /// Content-marker strategy with timings from `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            marker_selector: CONTENT_MARKERS.to_string(),
            page_load_timeout: config.page_load_timeout(),
            marker_timeout: config.element_wait_timeout(),
            settle_delay: config.js_load_delay(),
        }
    }
}

type Job = Box<dyn FnOnce(Rc<Engine>) -> LocalBoxFuture<'static, ()> + Send>;

enum Command {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

struct Worker {
    tx: mpsc::UnboundedSender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(settings: LaunchSettings) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("codewiki-browser".into())
            .spawn(move || run_loop(settings, rx))?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }
}

fn run_loop(settings: LaunchSettings, mut rx: mpsc::UnboundedReceiver<Command>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            warn!("failed to start browser runtime: {e}");
            return;
        },
    };
    let local = tokio::task::LocalSet::new();

    local.block_on(&runtime, async move {
        let engine = Rc::new(Engine::new(settings));
        debug!("browser loop started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Run(job) => {
                    tokio::task::spawn_local(job(Rc::clone(&engine)));
                },
                Command::Shutdown(done) => {
                    engine.shutdown().await;
                    let _ = done.send(());
                    break;
                },
            }
        }
        debug!("browser loop stopped");
    });
}

/// Handle to the process-wide browser.
///
/// Construct once and share behind an `Arc`. Nothing is launched until the
/// first operation.
pub struct BrowserSession {
    settings: LaunchSettings,
    worker: Mutex<Option<Worker>>,
    closed: AtomicBool,
}

impl BrowserSession {
    /// Session that will launch with `settings` on first use.
    pub const fn new(settings: LaunchSettings) -> Self {
        Self {
            settings,
            worker: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<Command>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Driver("browser session has been shut down".into()));
        }
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = slot.as_ref().filter(|w| !w.tx.is_closed()) {
            return Ok(worker.tx.clone());
        }
        let worker = Worker::spawn(self.settings.clone())
            .map_err(|e| Error::Driver(format!("failed to start browser thread: {e}")))?;
        let tx = worker.tx.clone();
        *slot = Some(worker);
        Ok(tx)
    }

    /// Run `op` on the browser thread and wait for its result.
    ///
    /// Dropping the returned future abandons the job: the worker drops the
    /// in-flight future, releasing any page it holds.
    pub(crate) async fn run<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Rc<Engine>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |engine| {
            Box::pin(async move {
                let mut reply_tx = reply_tx;
                let outcome = tokio::select! {
                    out = op(engine) => Some(out),
                    () = reply_tx.closed() => None,
                };
                match outcome {
                    Some(out) => {
                        let _ = reply_tx.send(out);
                    },
                    None => debug!("caller went away; browser job abandoned"),
                }
            })
        });

        self.sender()?
            .send(Command::Run(job))
            .map_err(|_| Error::Driver("browser thread is not running".into()))?;

        reply_rx
            .await
            .map_err(|_| Error::Driver("browser thread dropped the job".into()))?
    }

    /// Launch the browser if it is not running yet.
    pub async fn ensure_launched(&self) -> Result<()> {
        self.run(|engine| async move { engine.ensure_launched().await }).await
    }

    /// Navigate a fresh tab to `url`, wait per `wait`, return the HTML and
    /// close the tab.
    #[tracing::instrument(skip(self, wait))]
    pub async fn render_url(&self, url: &str, wait: &WaitStrategy) -> Result<RenderedPage> {
        let url = url.to_string();
        let wait = wait.clone();
        self.run(move |engine| async move {
            let guard = engine.open_page(&url, &wait).await?;
            tokio::time::sleep(POST_RENDER_SETTLE).await;
            let html = guard.page().content().await;
            guard.close().await;
            let html = html?;
            debug!(chars = html.len(), "captured rendered html");
            Ok(RenderedPage::new(url, html))
        })
        .await
    }

    /// Open `url` in a fresh tab and hand it to `op` for multi-step
    /// interaction.
    ///
    /// The tab is closed when `op` finishes, fails, or is abandoned.
    pub async fn with_interactive_page<F, T>(
        &self,
        url: &str,
        wait: &WaitStrategy,
        op: F,
    ) -> Result<T>
    where
        F: for<'p> FnOnce(&'p mut InteractivePage) -> LocalBoxFuture<'p, Result<T>>
            + Send
            + 'static,
        T: Send + 'static,
    {
        let url = url.to_string();
        let wait = wait.clone();
        self.run(move |engine| async move {
            let guard = engine.open_page(&url, &wait).await?;
            let mut page = InteractivePage::new(guard.page().clone());
            let out = op(&mut page).await;
            guard.close().await;
            out
        })
        .await
    }

    /// Close every page, then the browser, then stop the thread.
    ///
    /// Returns `false` if cleanup did not finish within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.closed.store(true, Ordering::Release);
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut worker) = worker else {
            return true;
        };

        info!("shutting down browser session");
        let (done_tx, done_rx) = oneshot::channel();
        if worker.tx.send(Command::Shutdown(done_tx)).is_err() {
            return true;
        }
        let clean = tokio::time::timeout(grace, done_rx).await.is_ok();
        if clean {
            if let Some(thread) = worker.thread.take() {
                let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            }
        } else {
            warn!(grace_secs = grace.as_secs(), "browser shutdown timed out");
        }
        clean
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_strategy_uses_config_timings() {
        let mut config = Config::default();
        config.timeouts.page_load_secs = 12;
        config.timeouts.element_wait_secs = 4;
        config.chat.js_load_delay_secs = 2;

        let wait = WaitStrategy::from_config(&config);
        assert_eq!(wait.marker_selector, CONTENT_MARKERS);
        assert_eq!(wait.page_load_timeout, Duration::from_secs(12));
        assert_eq!(wait.marker_timeout, Duration::from_secs(4));
        assert_eq!(wait.settle_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let session = BrowserSession::new(LaunchSettings::default());
        let (a, b) = tokio::join!(
            session.run(|_engine| async { Ok(1) }),
            session.run(|_engine| async { Ok(2) }),
        );
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert!(session.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_jobs_share_one_thread() {
        let session = BrowserSession::new(LaunchSettings::default());
        let first = session
            .run(|_engine| async { Ok(std::thread::current().id()) })
            .await
            .unwrap();
        let second = session
            .run(|_engine| async { Ok(std::thread::current().id()) })
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_ne!(first, std::thread::current().id());
        session.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_abandoned_job_does_not_kill_the_loop() {
        let session = BrowserSession::new(LaunchSettings::default());
        let slow = session.run(|_engine| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(50), slow).await;
        assert!(timed_out.is_err());

        let after = session.run(|_engine| async { Ok("still alive") }).await;
        assert_eq!(after.unwrap(), "still alive");
        session.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn test_operations_fail_after_shutdown() {
        let session = BrowserSession::new(LaunchSettings::default());
        assert!(session.shutdown(Duration::from_secs(1)).await);
        let err = session.run(|_engine| async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
    }
}
