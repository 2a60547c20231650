use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Random pause between two bounds, used to pace requests to upstream sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        // max below min collapses the range onto min
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// No pause at all
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn pick(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }

    pub async fn wait(&self) {
        let delay = self.pick();
        if !delay.is_zero() {
            debug!("Pausing {:.1}s", delay.as_secs_f32());
            tokio::time::sleep(delay).await;
        }
    }
}

/// How a scrape run walks the listing feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeParams {
    /// Listing feed page
    pub feed_url: String,
    /// Stop after this many listing pages
    pub max_listings: Option<usize>,
    /// Pause before each listing page
    pub page_delay: DelayRange,
}

impl ScrapeParams {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            max_listings: None,
            page_delay: DelayRange::from_secs(3, 6),
        }
    }

    /// No pacing, for offline runs against fakes
    pub fn unpaced(mut self) -> Self {
        self.page_delay = DelayRange::none();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_stay_inside_the_range() {
        let range = DelayRange::from_secs(3, 6);
        for _ in 0..50 {
            let d = range.pick();
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(6));
        }
    }

    #[test]
    fn reversed_range_uses_lower_bound() {
        let range = DelayRange::from_secs(5, 2);
        assert_eq!(range.pick(), Duration::from_secs(5));
        assert_eq!(DelayRange::none().pick(), Duration::ZERO);
    }
}
