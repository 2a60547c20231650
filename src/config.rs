use crate::scrapers::types::DelayRange;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How captions are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionMode {
    /// Built from the record's fields, no network
    Mock,
    /// Chat-completion model with validation and fallback
    Generative,
}

impl FromStr for CaptionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(CaptionMode::Mock),
            "generative" | "openai" | "live" => Ok(CaptionMode::Generative),
            other => bail!("unknown CAPTION_MODE '{other}' (expected mock or generative)"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Source
    pub feed_url: String,
    pub max_listings: Option<usize>,

    // Destination
    pub spreadsheet_id: String,
    pub access_token: Option<String>,
    pub drive_folder_id: Option<String>,

    // Captions
    pub caption_mode: CaptionMode,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,

    // Behaviour flags
    pub skip_image_upload: bool,
    pub disable_caption_update: bool,
    pub dry_run: bool,

    // Timing
    pub request_timeout: Duration,
    pub page_delay: DelayRange,
    pub caption_delay: DelayRange,

    pub output_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).with_context(|| format!("{key} environment variable is required"))
        };

        let dry_run = flag(get("DRY_RUN"), false)?;

        let caption_mode = match get("CAPTION_MODE") {
            Some(mode) => mode.parse::<CaptionMode>()?,
            None => match flag(get("USE_MOCK_OPENAI"), true)? {
                true => CaptionMode::Mock,
                false => CaptionMode::Generative,
            },
        };

        let spreadsheet_id = get("SPREADSHEET_ID")
            .or_else(|| get("SHEET_NAME"))
            .context("SPREADSHEET_ID environment variable is required")?;

        let access_token = get("GOOGLE_ACCESS_TOKEN");
        if access_token.is_none() && !dry_run {
            bail!("GOOGLE_ACCESS_TOKEN environment variable is required");
        }

        let skip_image_upload = flag(get("SKIP_IMAGE_UPLOAD"), true)?;
        let drive_folder_id = get("GOOGLE_DRIVE_FOLDER_ID");
        if !skip_image_upload && drive_folder_id.is_none() && !dry_run {
            bail!("GOOGLE_DRIVE_FOLDER_ID is required when image upload is enabled");
        }

        let openai_api_key = get("OPENAI_API_KEY");
        if caption_mode == CaptionMode::Generative && openai_api_key.is_none() {
            bail!("OPENAI_API_KEY is required for generative captions");
        }

        Ok(Self {
            feed_url: required("COMPASS_URL")?,
            max_listings: number(get("MAX_LISTINGS"), "MAX_LISTINGS")?,
            spreadsheet_id,
            access_token,
            drive_folder_id,
            caption_mode,
            openai_api_key,
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4".to_string()),
            openai_base_url: get("OPENAI_BASE_URL"),
            skip_image_upload,
            disable_caption_update: flag(get("DISABLE_CAPTION_UPDATE"), false)?,
            dry_run,
            request_timeout: Duration::from_secs(
                number(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS")?.unwrap_or(30),
            ),
            page_delay: DelayRange::from_secs(
                number(get("PAGE_DELAY_MIN_SECS"), "PAGE_DELAY_MIN_SECS")?.unwrap_or(3),
                number(get("PAGE_DELAY_MAX_SECS"), "PAGE_DELAY_MAX_SECS")?.unwrap_or(6),
            ),
            caption_delay: DelayRange::from_secs(
                number(get("CAPTION_DELAY_MIN_SECS"), "CAPTION_DELAY_MIN_SECS")?.unwrap_or(2),
                number(get("CAPTION_DELAY_MAX_SECS"), "CAPTION_DELAY_MAX_SECS")?.unwrap_or(5),
            ),
            output_dir: get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }

    pub fn upload_images(&self) -> bool {
        !self.skip_image_upload
    }

    fn log_keys(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) => {
                    let head: String = v.chars().take(5).collect();
                    format!("{head}...({} chars)", v.chars().count())
                }
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  COMPASS_URL: {}", self.feed_url);
        tracing::info!("  SPREADSHEET_ID: {}", self.spreadsheet_id);
        tracing::info!("  GOOGLE_ACCESS_TOKEN: {}", preview(&self.access_token));
        tracing::info!("  CAPTION_MODE: {:?}", self.caption_mode);
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  SKIP_IMAGE_UPLOAD: {}", self.skip_image_upload);
        tracing::info!("  DISABLE_CAPTION_UPDATE: {}", self.disable_caption_update);
        if self.dry_run {
            tracing::info!("  DRY_RUN: results stay in memory");
        }
    }
}

fn flag(value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}

fn number<T>(value: Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| v.trim().parse::<T>().with_context(|| format!("{key} must be a number")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    const BASE: [(&str, &str); 3] = [
        ("COMPASS_URL", "https://www.compass.com/homes-for-sale/montgomery-county-md/"),
        ("SPREADSHEET_ID", "sheet-1"),
        ("GOOGLE_ACCESS_TOKEN", "ya29.token"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(&BASE).unwrap();
        assert_eq!(config.caption_mode, CaptionMode::Mock);
        assert!(config.skip_image_upload);
        assert!(!config.disable_caption_update);
        assert_eq!(config.openai_model, "gpt-4");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.page_delay, DelayRange::from_secs(3, 6));
        assert_eq!(config.caption_delay, DelayRange::from_secs(2, 5));
        assert_eq!(config.max_listings, None);
        assert_eq!(config.output_dir, PathBuf::from("."));
    }

    #[test]
    fn sheet_name_is_accepted_as_alias() {
        let config = load(&[
            ("COMPASS_URL", "https://x"),
            ("SHEET_NAME", "legacy"),
            ("GOOGLE_ACCESS_TOKEN", "t"),
        ])
        .unwrap();
        assert_eq!(config.spreadsheet_id, "legacy");
    }

    #[test]
    fn missing_required_keys_fail() {
        let err = load(&[("SPREADSHEET_ID", "s"), ("GOOGLE_ACCESS_TOKEN", "t")]).unwrap_err();
        assert!(err.to_string().contains("COMPASS_URL"));

        let err = load(&[("COMPASS_URL", "u"), ("SPREADSHEET_ID", "s")]).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_ACCESS_TOKEN"));
    }

    #[test]
    fn dry_run_needs_no_token() {
        let config = load(&[("COMPASS_URL", "u"), ("SPREADSHEET_ID", "s"), ("DRY_RUN", "true")])
            .unwrap();
        assert!(config.dry_run);
        assert!(config.access_token.is_none());
    }

    #[test]
    fn legacy_mock_flag_selects_generative() {
        let mut pairs = BASE.to_vec();
        pairs.push(("USE_MOCK_OPENAI", "false"));
        assert!(load(&pairs).is_err());

        pairs.push(("OPENAI_API_KEY", "sk-test"));
        assert_eq!(load(&pairs).unwrap().caption_mode, CaptionMode::Generative);
    }

    #[test]
    fn image_upload_requires_parent_folder() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SKIP_IMAGE_UPLOAD", "false"));
        assert!(load(&pairs).is_err());

        pairs.push(("GOOGLE_DRIVE_FOLDER_ID", "root"));
        assert!(load(&pairs).unwrap().upload_images());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let mut pairs = BASE.to_vec();
        pairs.push(("MAX_LISTINGS", "lots"));
        let err = load(&pairs).unwrap_err();
        assert!(format!("{err:#}").contains("MAX_LISTINGS"));
    }
}
