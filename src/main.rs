use anyhow::{Context, Result};
use listing_scout::address::canonicalize;
use listing_scout::captions::{CaptionService, OpenAiClient};
use listing_scout::config::{CaptionMode, Config};
use listing_scout::http::build_client;
use listing_scout::images::HttpImageDownloader;
use listing_scout::models::ListingRecord;
use listing_scout::pipeline::Pipeline;
use listing_scout::scrapers::{ChromeFetcher, ScrapeParams};
use listing_scout::storage::{
    FileStore, GoogleDriveClient, GoogleSheetsClient, MemoryFileStore, MemorySheetStore, SheetStore,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("🏠 Listing Scout");
    info!("================");

    let config = Config::from_env()?;
    let http = build_client(config.request_timeout).context("Failed to create HTTP client")?;

    let (sheets, files): (Arc<dyn SheetStore>, Arc<dyn FileStore>) = match &config.access_token {
        Some(token) if !config.dry_run => (
            Arc::new(GoogleSheetsClient::new(http.clone(), token, &config.spreadsheet_id)),
            Arc::new(GoogleDriveClient::new(http.clone(), token)),
        ),
        _ => {
            info!("Dry run: spreadsheet and file store are kept in memory");
            (Arc::new(MemorySheetStore::new()), Arc::new(MemoryFileStore::new()))
        }
    };

    let captions = match config.caption_mode {
        CaptionMode::Mock => CaptionService::mock(),
        CaptionMode::Generative => {
            let mut client = OpenAiClient::new(
                http.clone(),
                config.openai_api_key.clone().unwrap_or_default(),
                &config.openai_model,
            );
            if let Some(url) = &config.openai_base_url {
                client = client.with_base_url(url);
            }
            info!("Generating captions with {}", client.model());
            CaptionService::generative(Arc::new(client)).with_pacing(config.caption_delay)
        }
    };

    let mut params = ScrapeParams::new(&config.feed_url);
    params.max_listings = config.max_listings;
    params.page_delay = config.page_delay;

    let fetcher = Arc::new(ChromeFetcher::launch(config.request_timeout)?);

    let mut pipeline = Pipeline::new(fetcher, sheets, captions, params)
        .preserve_captions(config.disable_caption_update);
    if config.upload_images() {
        let parent = config.drive_folder_id.clone().unwrap_or_else(|| "root".to_string());
        pipeline = pipeline.with_images(Arc::new(HttpImageDownloader::new(http.clone())), files, parent);
    }

    let output = pipeline.run().await?;
    output.report.log();

    save_records(&config.output_dir, &output.records).await?;
    let report_path = config.output_dir.join("run_report.json");
    tokio::fs::write(&report_path, serde_json::to_string_pretty(&output.report)?).await?;
    info!("💾 Saved run report to {}", report_path.display());

    Ok(())
}

/// Write every record to `scraped_listings.json` and one file per listing to `raw_scrape/`
async fn save_records(dir: &Path, records: &[ListingRecord]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let all = dir.join("scraped_listings.json");
    tokio::fs::write(&all, serde_json::to_string_pretty(records)?).await?;
    info!("💾 Saved all listings to {}", all.display());

    let raw_dir = dir.join("raw_scrape");
    tokio::fs::create_dir_all(&raw_dir).await?;
    for record in records {
        let key = canonicalize(&record.address);
        let stem = if record.has_address() && !key.is_empty() {
            key
        } else {
            record
                .listing_url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or("listing")
                .to_string()
        };
        let path = raw_dir.join(format!("{stem}.json"));
        tokio::fs::write(&path, serde_json::to_string_pretty(record)?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    info!("💾 Saved {} individual listing files to {}", records.len(), raw_dir.display());

    Ok(())
}
