use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

const COMMENT: char = '#';

/// Addresses still to scrape: non-blank lines not starting with `#`.
pub fn pending_urls(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| {
        format!(
            "'{}' not found or unreadable. Create a text file with one wishlist URL per line.",
            path.display()
        )
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT))
        .map(str::to_string)
        .collect())
}

/// Comment out `url` in the list so the next run skips it.
pub fn mark_scraped(path: &Path, url: &str) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not read '{}' to mark URL", path.display()))?;

    let mut out = String::with_capacity(text.len() + 1);
    for line in text.lines() {
        if line.trim() == url {
            out.push(COMMENT);
            out.push_str(line.trim());
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    fs::write(path, out).with_context(|| format!("Could not rewrite '{}'", path.display()))?;
    info!("Marked URL as scraped: {}", url);
    Ok(())
}
