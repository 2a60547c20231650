use anyhow::Result;
use async_trait::async_trait;

/// Source of rendered listing pages.
/// The browser fetcher is the production implementation; tests substitute canned HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// HTML of a page after client-side rendering
    async fn fetch_rendered_page(&self, url: &str) -> Result<String>;

    /// HTML of a listing feed page, after lazily loaded cards have appeared
    async fn fetch_feed_page(&self, url: &str) -> Result<String> {
        self.fetch_rendered_page(url).await
    }

    /// Name used in logs
    fn source_name(&self) -> &'static str;
}
