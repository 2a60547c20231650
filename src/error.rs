use thiserror::Error;

/// Failures talking to the spreadsheet or the file store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Partition not found: {0}")]
    MissingPartition(String),
}

impl StoreError {
    /// Rate limits, server errors and dropped connections are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Api { status, .. } => *status == 429 || *status >= 500,
            StoreError::InvalidResponse(_) | StoreError::MissingPartition(_) => false,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Network(err.to_string())
    }
}

/// Failures producing a caption
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("missing API key for generative captions")]
    MissingApiKey,

    #[error("http error: {0}")]
    Http(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("caption rejected: {0}")]
    Rejected(String),
}

impl CaptionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CaptionError::MissingApiKey => false,
            CaptionError::Api { status, .. } => *status == 429 || *status >= 500,
            CaptionError::Http(_) | CaptionError::InvalidResponse(_) | CaptionError::Rejected(_) => {
                true
            }
        }
    }
}

impl From<reqwest::Error> for CaptionError {
    fn from(err: reqwest::Error) -> Self {
        CaptionError::Http(err.to_string())
    }
}

/// Failures moving a single image from the listing site to the file store
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("download failed: {0}")]
    Download(String),

    #[error("image conversion failed: {0}")]
    Convert(#[from] image::ImageError),

    #[error("upload failed: {0}")]
    Upload(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let limited = StoreError::Api { status: 429, message: "quota".into() };
        let unavailable = StoreError::Api { status: 503, message: "down".into() };
        let forbidden = StoreError::Api { status: 403, message: "nope".into() };
        assert!(limited.is_transient());
        assert!(unavailable.is_transient());
        assert!(!forbidden.is_transient());
        assert!(StoreError::Network("reset".into()).is_transient());
    }

    #[test]
    fn format_rejections_are_retried_but_missing_keys_are_not() {
        assert!(CaptionError::Rejected("two paragraphs".into()).is_retryable());
        assert!(!CaptionError::MissingApiKey.is_retryable());
        assert!(!CaptionError::Api { status: 401, message: String::new() }.is_retryable());
    }
}
