//! Copies listing photos into the file store, one folder per listing.

use crate::address::file_stem;
use crate::error::ImageError;
use crate::storage::FileStore;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};

const FILE_STEM_CHARS: usize = 30;
const JPEG_QUALITY: u8 = 95;

/// Raw bytes of a fetched image
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ImageDownloader: Send + Sync {
    async fn download(&self, url: &str) -> Result<DownloadedImage, ImageError>;
}

/// Downloads images over plain HTTP
pub struct HttpImageDownloader {
    client: Client,
}

impl HttpImageDownloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(&self, url: &str) -> Result<DownloadedImage, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImageError::Download(format!("status {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::Download(e.to_string()))?;

        Ok(DownloadedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// File extension (with dot) for an image, from its URL path or content type
pub fn detect_extension(url: &str, content_type: Option<&str>) -> String {
    let path = reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    if let Some(dot) = file.rfind('.') {
        let ext = &file[dot..];
        if ext.len() > 1 && ext.len() <= 5 {
            return ext.to_lowercase();
        }
    }

    let mime = content_type
        .and_then(|c| c.split(';').next())
        .map(|c| c.trim().to_lowercase());
    match mime.as_deref() {
        Some("image/jpeg") | Some("image/jpg") => ".jpg",
        Some("image/png") => ".png",
        Some("image/webp") => ".webp",
        Some("image/gif") => ".gif",
        _ => ".jpg",
    }
    .to_string()
}

pub fn mime_for(ext: &str) -> &'static str {
    match ext {
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Re-encode WebP payloads as JPEG; everything else passes through untouched.
/// Returns the bytes to upload and their extension.
pub fn normalize(bytes: Vec<u8>, ext: &str) -> Result<(Vec<u8>, String), ImageError> {
    let is_webp = ext == ".webp" || matches!(image::guess_format(&bytes), Ok(ImageFormat::WebP));
    if !is_webp {
        return Ok((bytes, ext.to_string()));
    }

    let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::WebP)?;
    let rgb = decoded.to_rgb8();
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
    Ok((out, ".jpg".to_string()))
}

/// `<address stem>_<index><ext>`, stable for a given address and position
pub fn image_file_name(address: &str, index: usize, ext: &str) -> String {
    format!("{}_{index}{ext}", file_stem(address, FILE_STEM_CHARS))
}

pub struct ImagePipeline {
    downloader: Arc<dyn ImageDownloader>,
    files: Arc<dyn FileStore>,
}

impl ImagePipeline {
    pub fn new(downloader: Arc<dyn ImageDownloader>, files: Arc<dyn FileStore>) -> Self {
        Self { downloader, files }
    }

    /// Upload every image into `folder_id` and return the share links in
    /// source order. Images that fail are logged and left out.
    pub async fn upload_listing_images(
        &self,
        address: &str,
        folder_id: &str,
        urls: &[String],
    ) -> Vec<String> {
        let mut links = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            debug!("Processing image: {url}");
            match self.upload_one(address, folder_id, i + 1, url).await {
                Ok(link) => links.push(link),
                Err(e) => warn!("Skipping image {url}: {e}"),
            }
        }
        info!("Stored {}/{} images for {address}", links.len(), urls.len());
        links
    }

    async fn upload_one(
        &self,
        address: &str,
        folder_id: &str,
        index: usize,
        url: &str,
    ) -> Result<String, ImageError> {
        let image = self.downloader.download(url).await?;
        let ext = detect_extension(url, image.content_type.as_deref());
        let (bytes, ext) = normalize(image.bytes, &ext)?;
        let name = image_file_name(address, index, &ext);

        if let Some(link) = self.files.file_exists(&name, folder_id).await? {
            debug!("Found existing file: {name} -> {link}");
            return Ok(link);
        }

        let uploaded = self
            .files
            .upload_file(folder_id, &name, bytes, mime_for(&ext))
            .await?;
        self.files.set_public_readable(&uploaded.id).await?;
        debug!("Uploaded: {name} -> {}", uploaded.link);
        Ok(uploaded.link)
    }
}
