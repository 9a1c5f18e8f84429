use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const ENV_PREFIX: &str = "WISHLIST";

/// Runtime settings: built-in defaults, then `wishlist.toml` if present,
/// then `WISHLIST_*` environment variables (`.env` is loaded first).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub urls_file: PathBuf,
    pub session_file: PathBuf,
    pub affiliate_tag: String,
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub page_timeout_secs: u64,
    pub page_delay_secs: u64,
    pub user_agent: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn from_env(env: Environment) -> Result<Self> {
        Config::builder()
            .set_default("db_path", "data/wishlist.sqlite")?
            .set_default("urls_file", "wishlist_URL.txt")?
            .set_default("session_file", "cookies.json")?
            .set_default("affiliate_tag", "prographer-20")?
            .set_default("retries", 3_i64)?
            .set_default("retry_delay_secs", 5_i64)?
            .set_default("page_timeout_secs", 10_i64)?
            .set_default("page_delay_secs", 3_i64)?
            .set_default(
                "user_agent",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
            )?
            .add_source(File::with_name("wishlist").required(false))
            .add_source(env)
            .build()
            .context("Failed to build settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }
}
