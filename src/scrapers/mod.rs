pub mod agents;
pub mod browser;
pub mod county;
pub mod extractor;
pub mod feed;
pub mod traits;
pub mod types;

pub use browser::ChromeFetcher;
pub use county::resolve_county;
pub use extractor::extract_listing;
pub use traits::PageFetcher;
pub use types::{DelayRange, ScrapeParams};
