use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub crm_base_url: String,
    pub crm_api_key: String,
    /// Max in-flight sends per dispatched batch
    pub dispatch_concurrency: usize,
    /// Timeout applied to each CRM call (resolve and send)
    pub send_timeout_ms: u64,
    /// Sliding-window throttle for schedule dispatch, per schedule
    pub schedule_rate_limit_max: u32,
    pub schedule_rate_limit_window_ms: i64,
    /// How far a throttled fire is pushed back before retrying
    pub rate_limit_backoff_secs: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            crm_base_url: env::var("CRM_BASE_URL").context("CRM_BASE_URL must be set")?,
            crm_api_key: env::var("CRM_API_KEY").context("CRM_API_KEY must be set")?,
            dispatch_concurrency: env::var("DISPATCH_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("DISPATCH_CONCURRENCY must be a valid number")?,
            send_timeout_ms: env::var("SEND_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .context("SEND_TIMEOUT_MS must be a valid number")?,
            schedule_rate_limit_max: env::var("SCHEDULE_RATE_LIMIT_MAX")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("SCHEDULE_RATE_LIMIT_MAX must be a valid number")?,
            schedule_rate_limit_window_ms: env::var("SCHEDULE_RATE_LIMIT_WINDOW_MS")
                .unwrap_or_else(|_| "60000".to_string())
                .parse()
                .context("SCHEDULE_RATE_LIMIT_WINDOW_MS must be a valid number")?,
            rate_limit_backoff_secs: env::var("RATE_LIMIT_BACKOFF_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("RATE_LIMIT_BACKOFF_SECS must be a valid number")?,
        })
    }
}
