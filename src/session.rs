//! HTTP session used to load wishlist pages.
//!
//! Cookies are kept in a reqwest jar and persisted as JSON between runs so a
//! login or solved bot check carries over. The file can also be replaced by
//! cookies exported from a browser while a run is paused at the gate.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use url::Url;

use crate::error::FetchError;
use crate::settings::Settings;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub cookies: Vec<StoredCookie>,
    pub captured_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    /// Scheme + host the cookie was sent to, e.g. `https://www.amazon.com`.
    pub origin: String,
    pub name: String,
    pub value: String,
}

pub struct Session {
    client: reqwest::Client,
    jar: Arc<Jar>,
    state_path: PathBuf,
    origins: BTreeSet<String>,
    retries: u32,
    retry_delay: Duration,
}

impl Session {
    pub fn new(settings: &Settings) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.page_timeout())
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Session {
            client,
            jar,
            state_path: settings.session_file.clone(),
            origins: BTreeSet::new(),
            retries: settings.retries,
            retry_delay: settings.retry_delay(),
        })
    }

    /// Load cookies saved by an earlier run. A missing file is not an error.
    pub fn load_cookies(&mut self) -> Result<usize> {
        let Some(data) = read_session(&self.state_path)? else {
            warn!(
                "No session file at {:?}. You may need to log in.",
                self.state_path
            );
            return Ok(0);
        };
        let loaded = apply_cookies(&self.jar, &data.cookies);
        self.origins
            .extend(data.cookies.iter().map(|c| c.origin.clone()));
        info!("Cookies loaded successfully ({} cookies).", loaded);
        Ok(loaded)
    }

    pub fn save_cookies(&self) -> Result<usize> {
        let cookies: Vec<StoredCookie> = self
            .origins
            .iter()
            .filter_map(|origin| {
                let url = Url::parse(origin).ok()?;
                let header = self.jar.cookies(&url)?;
                Some(parse_cookie_header(origin, header.to_str().ok()?))
            })
            .flatten()
            .collect();
        let data = SessionData {
            captured_at: Some(Utc::now().timestamp()),
            cookies,
        };
        write_session(&self.state_path, &data)?;
        info!("Cookies saved successfully ({} cookies).", data.cookies.len());
        Ok(data.cookies.len())
    }

    /// GET `url` as text, retrying a fixed number of times with a fixed delay.
    pub async fn fetch(&mut self, url: &Url) -> Result<String, FetchError> {
        let attempts = self.retries.max(1);
        let mut attempt = 1;
        loop {
            match self.get_text(url).await {
                Ok(body) => {
                    self.origins.insert(url.origin().ascii_serialization());
                    return Ok(body);
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Failed to load {} (attempt {}/{}): {}, retrying in {:.1}s",
                        url,
                        attempt,
                        attempts,
                        e,
                        self.retry_delay.as_secs_f64()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts,
                        source,
                    })
                }
            }
        }
    }

    async fn get_text(&self, url: &Url) -> reqwest::Result<String> {
        self.client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

/// Holds a run until someone has dealt with a login or bot check out of band.
pub trait OperatorGate {
    async fn wait(&mut self, prompt: &str) -> Result<()>;
}

/// Waits for Enter on the terminal.
pub struct StdinGate;

impl OperatorGate for StdinGate {
    async fn wait(&mut self, prompt: &str) -> Result<()> {
        wait_for_operator(prompt).await
    }
}

async fn wait_for_operator(prompt: &str) -> Result<()> {
    println!("{}", prompt);
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(())
}

fn read_session(path: &Path) -> Result<Option<SessionData>> {
    if !path.exists() {
        return Ok(None);
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let data = serde_json::from_str(&text)
        .with_context(|| format!("Malformed session file {:?}", path))?;
    Ok(Some(data))
}

fn write_session(path: &Path, data: &SessionData) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

fn apply_cookies(jar: &Jar, cookies: &[StoredCookie]) -> usize {
    let mut applied = 0;
    for c in cookies {
        match Url::parse(&c.origin) {
            Ok(url) => {
                jar.add_cookie_str(&format!("{}={}; Path=/", c.name, c.value), &url);
                applied += 1;
            }
            Err(e) => warn!("Skipping cookie {} with bad origin {}: {}", c.name, c.origin, e),
        }
    }
    applied
}

/// Split a `Cookie:` request header (`a=1; b=2`) into stored cookies.
fn parse_cookie_header(origin: &str, header: &str) -> Vec<StoredCookie> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            if name.is_empty() {
                return None;
            }
            Some(StoredCookie {
                origin: origin.to_string(),
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
