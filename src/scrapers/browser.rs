use super::traits::PageFetcher;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results container on the feed page; scrolled to trigger lazy loading
const FEED_CONTAINER: &str = ".sc-mrags4.kgcPsu";

/// How long a timed-out render may keep its thread after its tab is closed
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// How to coax a feed page into rendering all of its cards
#[derive(Debug, Clone, Copy)]
pub struct ScrollPlan {
    pub steps: u32,
    pub step_px: u32,
    pub pause: Duration,
}

impl Default for ScrollPlan {
    fn default() -> Self {
        Self {
            steps: 20,
            step_px: 500,
            pause: Duration::from_millis(1500),
        }
    }
}

impl ScrollPlan {
    fn total(&self) -> Duration {
        self.pause * self.steps
    }

    fn script(&self) -> String {
        format!(
            r#"(() => {{
                const container = document.querySelector('{FEED_CONTAINER}');
                if (container) {{ container.scrollTop += {px}; }} else {{ window.scrollBy(0, {px}); }}
                return true;
            }})()"#,
            px = self.step_px
        )
    }
}

/// Page fetcher backed by headless Chrome
pub struct ChromeFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
    settle: Duration,
    scroll: ScrollPlan,
}

impl ChromeFetcher {
    /// Launch headless Chrome. `timeout` bounds every page load.
    pub fn launch(timeout: Duration) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((1440, 900)))
            .idle_browser_timeout(Duration::from_secs(600))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
            settle: Duration::from_secs(2),
            scroll: ScrollPlan::default(),
        })
    }

    async fn load(&self, url: &str, scroll: Option<ScrollPlan>) -> Result<String> {
        let browser = Arc::clone(&self.browser);
        let tab = tokio::task::spawn_blocking(move || browser.new_tab())
            .await
            .context("Browser task panicked")?
            .context("Failed to open tab")?;

        let target = url.to_string();
        let settle = self.settle;
        let budget = self.timeout + scroll.map(|s| s.total()).unwrap_or_default();
        run_bounded(tab, url, budget, CLOSE_GRACE, move |tab: &Tab| {
            render(tab, &target, settle, scroll)
        })
        .await
    }
}

/// A browser page that can be shut from any thread
trait Closeable: Send + Sync + 'static {
    fn close_now(&self) -> Result<()>;
}

impl Closeable for Tab {
    fn close_now(&self) -> Result<()> {
        self.close(true)?;
        Ok(())
    }
}

/// Closes its tab when dropped, however rendering ended
struct OpenTab<T: Closeable>(Arc<T>);

impl<T: Closeable> Drop for OpenTab<T> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close_now() {
            debug!("Closing tab failed: {e}");
        }
    }
}

/// Run `work` against `tab` on a blocking thread within `budget`.
///
/// The tab is closed on every exit path. On timeout it is closed under the
/// running work so pending browser calls fail, and the thread gets `grace`
/// to finish before the error is returned.
async fn run_bounded<T, F>(
    tab: Arc<T>,
    url: &str,
    budget: Duration,
    grace: Duration,
    work: F,
) -> Result<String>
where
    T: Closeable,
    F: FnOnce(&T) -> Result<String> + Send + 'static,
{
    let guard = OpenTab(Arc::clone(&tab));
    let mut task = tokio::task::spawn_blocking(move || {
        let guard = guard;
        work(&*guard.0)
    });

    match tokio::time::timeout(budget, &mut task).await {
        Ok(joined) => joined.context("Browser task panicked")?,
        Err(_) => {
            warn!("Loading {url} exceeded {budget:?}, closing its tab");
            if let Err(e) = tab.close_now() {
                debug!("Closing tab for {url} failed: {e}");
            }
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("Render of {url} still running {grace:?} after its tab was closed");
            }
            bail!("Timed out after {budget:?} loading {url}")
        }
    }
}

/// Navigate `tab` to `url` and return its rendered HTML
fn render(tab: &Tab, url: &str, settle: Duration, scroll: Option<ScrollPlan>) -> Result<String> {
    tab.navigate_to(url)
        .with_context(|| format!("Failed to navigate to {url}"))?;
    tab.wait_until_navigated()
        .with_context(|| format!("Navigation to {url} did not finish"))?;
    thread::sleep(settle);

    if let Some(plan) = scroll {
        if tab
            .wait_for_element_with_custom_timeout(FEED_CONTAINER, Duration::from_secs(10))
            .is_err()
        {
            debug!("Feed container not found on {url}; scrolling the window instead");
        }
        let script = plan.script();
        for _ in 0..plan.steps {
            tab.evaluate(&script, false).context("Scroll script failed")?;
            thread::sleep(plan.pause);
        }
    }

    let html = tab.get_content().context("Failed to read page HTML")?;
    debug!("Rendered {url} ({} bytes)", html.len());
    Ok(html)
}

#[async_trait]
impl PageFetcher for ChromeFetcher {
    async fn fetch_rendered_page(&self, url: &str) -> Result<String> {
        self.load(url, None).await
    }

    async fn fetch_feed_page(&self, url: &str) -> Result<String> {
        self.load(url, Some(self.scroll)).await
    }

    fn source_name(&self) -> &'static str {
        "chrome"
    }
}
