//! Configuration validation
//!
//! Validates configuration at startup to catch misconfigurations early.

use anyhow::Result;
use demix_core::Config;

/// Validate configuration beyond what parsing checks.
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    if config.is_production() {
        if config.cors_origins.iter().any(|o| o == "*") {
            anyhow::bail!(
                "CORS configured to allow all origins (*) in production. \
                 Set explicit origins via CORS_ORIGINS."
            );
        }
        if config.url_allow_private_hosts {
            tracing::warn!(
                "URL_ALLOW_PRIVATE_HOSTS is enabled in production - links may reach internal addresses"
            );
        }
    }

    if config.staging_dir == config.separated_dir {
        anyhow::bail!("STAGING_DIR and SEPARATED_DIR must be different directories");
    }

    if config.upload_max_attempts > 10 {
        tracing::warn!(
            upload_max_attempts = config.upload_max_attempts,
            "UPLOAD_MAX_ATTEMPTS is very high - failed requests may take minutes to answer"
        );
    }

    Ok(())
}
