//! Configuration module
//!
//! The whole service is configured from environment variables, read once at
//! startup into [`Config`] and passed explicitly to everything that needs it.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const DEFAULT_PORT: u16 = 5000;
const MAX_AUDIO_SIZE_MB: usize = 100;
const URL_FETCH_TIMEOUT_SECS: u64 = 60;
const UPLOAD_MAX_ATTEMPTS: u32 = 5;
const UPLOAD_INITIAL_BACKOFF_MS: u64 = 1000;
const UPLOAD_MAX_BACKOFF_MS: u64 = 8000;
const HTTP_CONCURRENCY_LIMIT: usize = 64;
const DEFAULT_DEMUCS_MODEL: &str = "htdemucs";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    pub http_concurrency_limit: usize,
    // Storage
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub upload_original: bool,
    // Stem upload retry
    pub upload_max_attempts: u32,
    pub upload_initial_backoff: Duration,
    pub upload_max_backoff: Duration,
    // Staging and separation
    pub staging_dir: PathBuf,
    pub separated_dir: PathBuf,
    pub demucs_command: String,
    pub demucs_model: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_audio_size_bytes: usize,
    // Remote links
    pub url_fetch_timeout: Duration,
    pub url_upload_allowlist: Option<Vec<String>>,
    pub url_allow_private_hosts: bool,
}

impl Config {
    /// Load `.env` (if present) and read the configuration from the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());
        let is_production = is_production_name(&environment);

        let cors_origins_str = lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string());
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins = split_list(&cors_origins_str);

        let server_port = match lookup("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            None => DEFAULT_PORT,
        };

        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::S3,
        };

        let parse_or = |key: &str, default: u64| -> u64 {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str| -> bool {
            lookup(key)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let staging_dir = lookup("STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("demix").join("uploads"));

        let max_audio_size_mb = parse_or("MAX_AUDIO_SIZE_MB", MAX_AUDIO_SIZE_MB as u64);
        let max_audio_size_bytes = max_audio_size_mb
            .checked_mul(1024 * 1024)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .ok_or_else(|| {
                anyhow::anyhow!("MAX_AUDIO_SIZE_MB is too large: {}", max_audio_size_mb)
            })?;

        let url_upload_allowlist = lookup("URL_UPLOAD_ALLOWLIST")
            .map(|s| split_list(&s))
            .filter(|list| !list.is_empty());

        Ok(Config {
            server_port,
            environment,
            cors_origins,
            http_concurrency_limit: parse_or(
                "HTTP_CONCURRENCY_LIMIT",
                HTTP_CONCURRENCY_LIMIT as u64,
            ) as usize,
            storage_backend,
            s3_bucket: lookup("AWS_BUCKET_NAME").filter(|s| !s.trim().is_empty()),
            s3_region: lookup("AWS_DEFAULT_REGION")
                .or_else(|| lookup("AWS_REGION"))
                .filter(|s| !s.trim().is_empty()),
            s3_endpoint: lookup("S3_ENDPOINT").filter(|s| !s.trim().is_empty()),
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL"),
            upload_original: flag("UPLOAD_ORIGINAL"),
            upload_max_attempts: parse_or("UPLOAD_MAX_ATTEMPTS", UPLOAD_MAX_ATTEMPTS as u64)
                as u32,
            upload_initial_backoff: Duration::from_millis(parse_or(
                "UPLOAD_INITIAL_BACKOFF_MS",
                UPLOAD_INITIAL_BACKOFF_MS,
            )),
            upload_max_backoff: Duration::from_millis(parse_or(
                "UPLOAD_MAX_BACKOFF_MS",
                UPLOAD_MAX_BACKOFF_MS,
            )),
            staging_dir,
            separated_dir: lookup("SEPARATED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("separated")),
            demucs_command: lookup("DEMUCS_COMMAND").unwrap_or_else(|| "demucs".to_string()),
            demucs_model: lookup("DEMUCS_MODEL")
                .unwrap_or_else(|| DEFAULT_DEMUCS_MODEL.to_string()),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: lookup("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            max_audio_size_bytes,
            url_fetch_timeout: Duration::from_secs(parse_or(
                "URL_FETCH_TIMEOUT_SECS",
                URL_FETCH_TIMEOUT_SECS,
            )),
            url_upload_allowlist,
            url_allow_private_hosts: flag("URL_ALLOW_PRIVATE_HOSTS"),
        })
    }

    pub fn is_production(&self) -> bool {
        is_production_name(&self.environment)
    }

    /// Check cross-field requirements that parsing alone cannot catch.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    anyhow::bail!("AWS_BUCKET_NAME must be set when STORAGE_BACKEND=s3");
                }
                if self.s3_region.is_none() {
                    anyhow::bail!("AWS_DEFAULT_REGION must be set when STORAGE_BACKEND=s3");
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    anyhow::bail!("LOCAL_STORAGE_PATH must be set when STORAGE_BACKEND=local");
                }
            }
        }

        if self.upload_max_attempts == 0 {
            anyhow::bail!("UPLOAD_MAX_ATTEMPTS must be at least 1");
        }
        if self.upload_max_backoff < self.upload_initial_backoff {
            anyhow::bail!("UPLOAD_MAX_BACKOFF_MS must not be lower than UPLOAD_INITIAL_BACKOFF_MS");
        }
        if self.demucs_command.split_whitespace().next().is_none() {
            anyhow::bail!("DEMUCS_COMMAND must not be empty");
        }
        if self.max_audio_size_bytes == 0 {
            anyhow::bail!("MAX_AUDIO_SIZE_MB must be greater than 0");
        }
        if self.http_concurrency_limit == 0 {
            anyhow::bail!("HTTP_CONCURRENCY_LIMIT must be greater than 0");
        }

        Ok(())
    }
}

fn is_production_name(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
