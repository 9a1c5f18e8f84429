pub mod dom;
pub mod extract;

use url::Url;

use crate::error::PageError;
use dom::Node;
use extract::{RawItem, UNKNOWN_WISHLIST};

const TITLE_SELECTOR: &str = "h2.a-size-base";
const DETAILS_SELECTOR: &str = ".g-item-sortable";
const WISHLIST_NAME_SELECTOR: &str = "span#profile-list-name";
const NEXT_PAGE_SELECTOR: &str = "ul.a-pagination li.a-last a";
const CHALLENGE_SELECTOR: &str = r#"form[action*="validateCaptcha"]"#;

pub fn wishlist_name<N: Node>(page: &N) -> String {
    page.find(WISHLIST_NAME_SELECTOR)
        .map(|n| n.inner_text())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_WISHLIST.to_string())
}

/// Pair item headings with item containers by position. Both collections
/// must be non-empty and of equal length, otherwise the page is unusable.
pub fn pair_items<N: Node>(page: &N) -> Result<Vec<RawItem<N>>, PageError> {
    let titles = page.find_all(TITLE_SELECTOR);
    let details = page.find_all(DETAILS_SELECTOR);

    if titles.is_empty() || details.is_empty() {
        return Err(PageError::NoItems);
    }
    if titles.len() != details.len() {
        return Err(PageError::CountMismatch {
            titles: titles.len(),
            details: details.len(),
        });
    }

    Ok(titles
        .into_iter()
        .zip(details)
        .map(|(title, details)| RawItem { title, details })
        .collect())
}

pub fn next_page_url<N: Node>(page: &N, page_url: &Url) -> Option<Url> {
    let href = page.find(NEXT_PAGE_SELECTOR)?.attr("href")?;
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href == "#" {
        return None;
    }
    page_url.join(href).ok()
}

/// True when the page is a bot-check form instead of the wishlist.
pub fn is_challenge<N: Node>(page: &N) -> bool {
    page.find(CHALLENGE_SELECTOR).is_some()
}
