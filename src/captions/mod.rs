//! Social-media captions for listings.

pub mod format;
pub mod openai;

pub use openai::OpenAiClient;

use crate::error::CaptionError;
use crate::models::ListingRecord;
use crate::retry::RetryPolicy;
use crate::scrapers::types::DelayRange;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Text completion backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, CaptionError>;
}

enum Mode {
    Mock,
    Generative(Arc<dyn TextGenerator>),
}

/// Produces a caption for every listing; never fails
pub struct CaptionService {
    mode: Mode,
    retry: RetryPolicy,
    pacing: DelayRange,
}

impl CaptionService {
    pub fn mock() -> Self {
        Self {
            mode: Mode::Mock,
            retry: RetryPolicy::default(),
            pacing: DelayRange::none(),
        }
    }

    pub fn generative(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            mode: Mode::Generative(generator),
            retry: RetryPolicy::default(),
            pacing: DelayRange::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pause before and after each generated caption
    pub fn with_pacing(mut self, pacing: DelayRange) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn generate(&self, record: &ListingRecord) -> String {
        let generator = match &self.mode {
            Mode::Mock => return format::mock_caption(record),
            Mode::Generative(generator) => generator,
        };

        self.pacing.wait().await;
        let prompt = format::build_prompt(record);
        let prompt = prompt.as_str();
        let result = self
            .retry
            .run(
                &format!("caption for {}", record.listing_url),
                CaptionError::is_retryable,
                |_| async move {
                    let caption = generator.complete(format::SYSTEM_PROMPT, prompt).await?;
                    format::validate(&caption).map_err(CaptionError::Rejected)?;
                    Ok(caption)
                },
            )
            .await;
        self.pacing.wait().await;

        match result {
            Ok(caption) => {
                info!("Generated caption for {}", record.address);
                caption
            }
            Err(e) => {
                warn!(
                    "Caption generation failed for {}: {e}; using fallback",
                    record.listing_url
                );
                format::fallback_caption(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns scripted replies in order, repeating the last one
    struct Scripted {
        replies: Mutex<Vec<Result<String, CaptionError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, CaptionError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, CaptionError> {
            *self.calls.lock().unwrap() += 1;
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                return replies.remove(0);
            }
            match &replies[0] {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(CaptionError::Http(e.to_string())),
            }
        }
    }

    fn record() -> ListingRecord {
        let mut r = ListingRecord::empty("https://www.compass.com/listing/9");
        r.address = "9 Elm Ct, Potomac, MD 20854".into();
        r.price = "$3,100,000".into();
        r.beds = "5".into();
        r.baths = "6".into();
        r.sqft = "7,200".into();
        r
    }

    fn good_caption() -> String {
        format!(
            "{}\n\nBig lawn.\n\nBig kitchen.\n\nFollow us.",
            format::header(&record())
        )
    }

    #[tokio::test]
    async fn mock_mode_needs_no_generator() {
        let service = CaptionService::mock();
        let caption = service.generate(&record()).await;
        assert!(caption.starts_with("📍 9 Elm Ct, Potomac, MD 20854"));
        assert_eq!(format::validate(&caption), Ok(()));
        assert_eq!(caption, service.generate(&record()).await);
    }

    #[tokio::test]
    async fn valid_generation_is_returned() {
        let generator = Scripted::new(vec![Ok(good_caption())]);
        let service = CaptionService::generative(generator.clone())
            .with_retry(RetryPolicy::immediate(3));
        assert_eq!(service.generate(&record()).await, good_caption());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_then_valid_retries() {
        let generator = Scripted::new(vec![Ok("just some text".into()), Ok(good_caption())]);
        let service = CaptionService::generative(generator.clone())
            .with_retry(RetryPolicy::immediate(3));
        assert_eq!(service.generate(&record()).await, good_caption());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back() {
        let generator = Scripted::new(vec![Err(CaptionError::Http("timeout".into()))]);
        let service = CaptionService::generative(generator.clone())
            .with_retry(RetryPolicy::immediate(3));
        let caption = service.generate(&record()).await;
        assert_eq!(caption, format::fallback_caption(&record()));
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn missing_key_falls_back_without_retrying() {
        let generator = Scripted::new(vec![Err(CaptionError::MissingApiKey), Ok(good_caption())]);
        let service = CaptionService::generative(generator.clone())
            .with_retry(RetryPolicy::immediate(3));
        let caption = service.generate(&record()).await;
        assert_eq!(caption, format::fallback_caption(&record()));
        assert_eq!(generator.calls(), 1);
    }
}
