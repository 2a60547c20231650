//! One scrape run: feed page, listing pages, captions, images, then upsert.
//!
//! Listings are handled strictly one after another. Every collaborator is
//! passed in, so a run can be driven entirely by in-memory fakes.

use crate::address::canonicalize;
use crate::captions::CaptionService;
use crate::folders::FolderResolver;
use crate::images::{ImageDownloader, ImagePipeline};
use crate::models::{ListingRecord, RowSchema};
use crate::reconcile::{group_by_partition, PartitionReport, Reconciler};
use crate::retry::RetryPolicy;
use crate::scrapers::{extract_listing, feed, resolve_county, PageFetcher, ScrapeParams};
use crate::storage::{FileStore, SheetStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Counters for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub listings_found: usize,
    pub scraped: usize,
    pub duplicates_skipped: usize,
    pub fetch_failures: usize,
    pub folders_created: usize,
    pub partitions: Vec<PartitionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub partition: String,
    pub created: bool,
    pub header_migrated: bool,
    pub updated: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl From<&PartitionReport> for PartitionSummary {
    fn from(report: &PartitionReport) -> Self {
        Self {
            partition: report.partition.clone(),
            created: report.created,
            header_migrated: report.header_migrated,
            updated: report.updated,
            inserted: report.inserted,
            unchanged: report.unchanged,
            failed: report.failures.len(),
        }
    }
}

impl RunReport {
    pub fn log(&self) {
        info!(
            "Run finished: {} listings found, {} scraped, {} duplicates skipped, {} failed",
            self.listings_found, self.scraped, self.duplicates_skipped, self.fetch_failures
        );
        if self.folders_created > 0 {
            info!("  {} new image folders created", self.folders_created);
        }
        for p in &self.partitions {
            info!(
                "  {}: {} updated, {} inserted, {} unchanged, {} failed{}",
                p.partition,
                p.updated,
                p.inserted,
                p.unchanged,
                p.failed,
                if p.created { " (new partition)" } else { "" }
            );
        }
    }
}

/// Records scraped in a run plus what happened to them
#[derive(Debug)]
pub struct RunOutput {
    pub records: Vec<ListingRecord>,
    pub report: RunReport,
}

struct ImageStage {
    files: Arc<dyn FileStore>,
    uploader: ImagePipeline,
    folders: FolderResolver,
}

pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    sheets: Arc<dyn SheetStore>,
    captions: CaptionService,
    params: ScrapeParams,
    images: Option<ImageStage>,
    preserve_captions: bool,
    store_retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        sheets: Arc<dyn SheetStore>,
        captions: CaptionService,
        params: ScrapeParams,
    ) -> Self {
        Self {
            fetcher,
            sheets,
            captions,
            params,
            images: None,
            preserve_captions: false,
            store_retry: RetryPolicy::default(),
        }
    }

    /// Copy listing photos into per-listing folders under `parent_folder_id`
    pub fn with_images(
        mut self,
        downloader: Arc<dyn ImageDownloader>,
        files: Arc<dyn FileStore>,
        parent_folder_id: impl Into<String>,
    ) -> Self {
        self.images = Some(ImageStage {
            uploader: ImagePipeline::new(downloader, Arc::clone(&files)),
            files,
            folders: FolderResolver::new(parent_folder_id),
        });
        self
    }

    /// Keep captions already stored for existing rows
    pub fn preserve_captions(mut self, preserve: bool) -> Self {
        self.preserve_captions = preserve;
        self
    }

    pub fn with_store_retry(mut self, retry: RetryPolicy) -> Self {
        self.store_retry = retry;
        self
    }

    pub async fn run(&mut self) -> Result<RunOutput> {
        let partitions = self
            .sheets
            .list_partitions()
            .await
            .context("Could not access the destination spreadsheet")?;
        info!("Destination has {} partitions", partitions.len());

        info!("Loading listing feed {} via {}", self.params.feed_url, self.fetcher.source_name());
        let feed_html = self
            .fetcher
            .fetch_feed_page(&self.params.feed_url)
            .await
            .context("Failed to load the listing feed")?;

        let mut visited = HashSet::new();
        let mut urls = feed::listing_urls(&feed_html, &mut visited);
        let mut report = RunReport {
            listings_found: urls.len(),
            ..RunReport::default()
        };
        info!("Total listings found: {}", urls.len());
        if let Some(max) = self.params.max_listings {
            urls.truncate(max);
        }

        let mut seen_addresses = HashSet::new();
        let mut records = Vec::new();
        for url in &urls {
            self.params.page_delay.wait().await;
            info!("Scraping: {url}");

            let html = match self.fetcher.fetch_rendered_page(url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Skipping {url}: {e:#}");
                    report.fetch_failures += 1;
                    continue;
                }
            };

            let mut record = extract_listing(url, &html);
            record.account_group = resolve_county(url, &self.params.feed_url, &record.address);

            if record.has_address() && !seen_addresses.insert(canonicalize(&record.address)) {
                info!("Skipping {url}: {} was already scraped this run", record.address);
                report.duplicates_skipped += 1;
                continue;
            }

            record.caption = Some(self.captions.generate(&record).await);
            report.scraped += 1;
            records.push(record);
        }

        if let Some(stage) = self.images.as_mut() {
            report.folders_created = upload_all(stage, &mut records).await;
        }

        let mut reconciler = Reconciler::new(
            Arc::clone(&self.sheets),
            RowSchema::new(self.images.is_some()),
        )
        .preserve_captions(self.preserve_captions)
        .with_retry(self.store_retry);
        reconciler.prime_partitions(partitions);

        let reports = reconciler
            .reconcile(&group_by_partition(records.clone()))
            .await
            .context("Failed to write listings to the destination spreadsheet")?;
        report.partitions = reports.iter().map(PartitionSummary::from).collect();

        Ok(RunOutput { records, report })
    }
}

/// Create the folders no listing has yet, then upload every listing's images.
/// Returns the number of folders created.
async fn upload_all(stage: &mut ImageStage, records: &mut [ListingRecord]) -> usize {
    let addresses: Vec<&str> = records
        .iter()
        .filter(|r| !r.image_urls.is_empty() && r.has_address())
        .map(|r| r.address.as_str())
        .collect();
    let created = match stage
        .folders
        .create_missing(stage.files.as_ref(), &addresses)
        .await
    {
        Ok(created) => created,
        Err(e) => {
            warn!("Could not index listing folders: {e}");
            0
        }
    };

    for record in records.iter_mut() {
        let links = upload_images(stage, record).await;
        record.image_urls = links;
    }
    created
}

/// Upload a listing's images, returning the stored links in source order
async fn upload_images(stage: &mut ImageStage, record: &ListingRecord) -> Vec<String> {
    if record.image_urls.is_empty() {
        return Vec::new();
    }
    if !record.has_address() {
        warn!("No address for {}; images not uploaded", record.listing_url);
        return Vec::new();
    }

    let folder_id = match stage
        .folders
        .ensure_folder(stage.files.as_ref(), &record.address)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!("No folder for {}: {e}; images not uploaded", record.listing_url);
            return Vec::new();
        }
    };

    stage
        .uploader
        .upload_listing_images(&record.address, &folder_id, &record.image_urls)
        .await
}
