use chrono::NaiveDate;

use crate::parser::dom::Node;

const IN_STOCK: &str = "In Stock";
const DATE_PREFIX: &str = "Item added ";
const DATE_FORMAT: &str = "%B %d, %Y";

/// "In Stock" when the item shows a Prime badge.
///
/// The badge marks delivery-program eligibility, not inventory, so an item
/// without it is reported as unknown rather than out of stock.
pub fn stock_status<N: Node>(details: &N) -> Option<&'static str> {
    details.find("i.a-icon-prime").map(|_| IN_STOCK)
}

pub fn reviews<N: Node>(details: &N) -> Option<u32> {
    count(details, r#"a[id^="review_count_"]"#)
}

/// How many of this item the list owner asked for.
pub fn needs<N: Node>(details: &N) -> Option<u32> {
    count(details, r#"span[id^="itemRequested_I"]"#)
}

/// How many have already been bought from the list.
pub fn has<N: Node>(details: &N) -> Option<u32> {
    count(details, r#"span[id^="itemPurchased_I"]"#)
}

pub fn date_added<N: Node>(details: &N) -> Option<NaiveDate> {
    let text = details.find(r#"span[id^="itemAddedDate"]"#)?.inner_text();
    parse_date_added(&text)
}

pub fn stars<N: Node>(details: &N) -> Option<f64> {
    let label = details
        .find(r#"a[aria-label*="out of 5 stars"]"#)?
        .attr("aria-label")?;
    parse_stars(&label)
}

fn count<N: Node>(details: &N, selector: &str) -> Option<u32> {
    parse_count(&details.find(selector)?.inner_text())
}

pub fn parse_count(text: &str) -> Option<u32> {
    text.trim().replace(',', "").parse().ok()
}

pub fn parse_date_added(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let text = text.strip_prefix(DATE_PREFIX).unwrap_or(text).trim();
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

/// Leading number of an "N out of 5 stars" label.
pub fn parse_stars(label: &str) -> Option<f64> {
    label
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|s| (0.0..=5.0).contains(s))
}
