pub mod details;
pub mod identity;
pub mod price;
pub mod variants;

use std::fmt::Debug;

use tracing::{info, warn};
use url::Url;

use super::dom::Node;
use crate::db::ProductRecord;

pub const NO_SUBTITLE: &str = "No subtitle";
pub const NO_PATTERN: &str = "No pattern";
pub const NO_STYLE: &str = "No style";
pub const UNKNOWN_STOCK: &str = "Unknown stock status";
pub const UNKNOWN_WISHLIST: &str = "Unknown Wishlist";

/// One wishlist entry: the heading that carries the product anchor and the
/// sortable container that carries everything else. Paired by position.
#[derive(Debug, Clone, Copy)]
pub struct RawItem<N> {
    pub title: N,
    pub details: N,
}

/// Per-item inputs that do not come from the item markup itself.
#[derive(Debug, Clone, Copy)]
pub struct ItemContext<'a> {
    /// 1-based position on the page, used in log lines.
    pub index: usize,
    pub wishlist_name: &'a str,
    pub page_url: Option<&'a Url>,
    pub affiliate_tag: &'a str,
}

/// Build a complete record from one item. Every field falls back to its
/// default on its own, so this never fails.
pub fn extract_item<N: Node>(item: &RawItem<N>, ctx: &ItemContext<'_>) -> ProductRecord {
    let n = ctx.index;
    let d = &item.details;

    let id = identity::identity(&item.title, ctx.page_url);
    match &id.asin {
        Some(asin) => info!(
            "Product {} - Extracted ASIN: {}, Title: {}, Link: {}",
            n, asin, id.title, id.link
        ),
        None => warn!("Product {} - Title and ASIN not found.", n),
    }

    let subtitle = field(n, "Subtitle", identity::subtitle(d), NO_SUBTITLE.to_string());
    let price = field(n, "Price", price::current_price(d), 0.0);

    let banner = price::price_drop(d);
    let price_added = field(n, "Price Added", banner.was, price);
    let price_drop_percent = field(n, "Price Drop", banner.percent, 0.0);

    let stock_status = field(
        n,
        "Stock Status",
        details::stock_status(d).map(str::to_string),
        UNKNOWN_STOCK.to_string(),
    );
    let reviews = field(n, "Reviews", details::reviews(d), 0);
    let needs_product = field(n, "Needs", details::needs(d), 0);
    let has_product = field(n, "Has", details::has(d), 0);
    let date_added = optional(n, "Date Added", details::date_added(d));
    let image_url = optional(n, "Image URL", identity::image_url(d, ctx.page_url));
    let stars = optional(n, "Stars", details::stars(d));

    let found = variants::pattern_and_style(d);
    let pattern = field(n, "Pattern", found.pattern, NO_PATTERN.to_string());
    let style = field(n, "Style", found.style, NO_STYLE.to_string());

    let affiliate_link = id
        .asin
        .as_ref()
        .map(|_| identity::affiliate_link(&id.link, ctx.affiliate_tag));

    let wishlist_name = if ctx.wishlist_name.trim().is_empty() {
        UNKNOWN_WISHLIST.to_string()
    } else {
        ctx.wishlist_name.to_string()
    };

    ProductRecord {
        asin: id.asin,
        title: id.title,
        subtitle,
        price,
        price_added,
        price_drop_percent,
        stock_status,
        reviews,
        needs_product,
        has_product,
        stars,
        date_added,
        image_url,
        product_link: id.link,
        affiliate_link,
        pattern,
        style,
        wishlist_name,
    }
}

fn field<T: Debug>(index: usize, name: &str, value: Option<T>, default: T) -> T {
    match value {
        Some(v) => {
            info!("Product {} - Extracted {}: {:?}", index, name, v);
            v
        }
        None => {
            warn!("Product {} - {} not found, using {:?}.", index, name, default);
            default
        }
    }
}

fn optional<T: Debug>(index: usize, name: &str, value: Option<T>) -> Option<T> {
    match &value {
        Some(v) => info!("Product {} - Extracted {}: {:?}", index, name, v),
        None => warn!("Product {} - {} not found.", index, name),
    }
    value
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::pair_items;
    use chrono::NaiveDate;
    use scraper::Html;

    fn page_url() -> Url {
        Url::parse("https://www.amazon.com/hz/wishlist/ls/ABC123").unwrap()
    }

    fn extract_fixture(fixture: &str) -> Vec<ProductRecord> {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", fixture)).unwrap();
        let doc = Html::parse_document(&html);
        let root = doc.root_element();
        let items = pair_items(&root).unwrap();
        let url = page_url();
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let ctx = ItemContext {
                    index: i + 1,
                    wishlist_name: "Gifts",
                    page_url: Some(&url),
                    affiliate_tag: "prographer-20",
                };
                extract_item(item, &ctx)
            })
            .collect()
    }

    #[test]
    fn full_item() {
        let records = extract_fixture("wishlist_page");
        let r = &records[0];
        assert_eq!(r.asin.as_deref(), Some("B0FULL0001"));
        assert_eq!(r.title, "Espresso Grinder");
        assert_eq!(r.subtitle, "Acme Kitchen");
        assert_eq!(r.price, 1234.56);
        assert_eq!(r.price_added, 1499.99);
        assert_eq!(r.price_drop_percent, 0.18);
        assert_eq!(r.stock_status, "In Stock");
        assert_eq!(r.reviews, 12345);
        assert_eq!(r.needs_product, 2);
        assert_eq!(r.has_product, 1);
        assert_eq!(r.stars, Some(4.6));
        assert_eq!(r.date_added, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(
            r.image_url.as_deref(),
            Some("https://m.media-amazon.com/images/I/grinder.jpg")
        );
        assert_eq!(
            r.product_link,
            "https://www.amazon.com/Espresso-Grinder/dp/B0FULL0001/?coliid=I1&ref_=list"
        );
        assert_eq!(
            r.affiliate_link.as_deref(),
            Some("https://www.amazon.com/Espresso-Grinder/dp/B0FULL0001/?coliid=I1&ref_=list&linkCode=ll1&tag=prographer-20")
        );
        assert_eq!(r.pattern, "Matte Black");
        assert_eq!(r.style, "Burr");
        assert_eq!(r.wishlist_name, "Gifts");
    }

    #[test]
    fn sparse_item_uses_defaults() {
        let records = extract_fixture("wishlist_page");
        let r = &records[1];
        assert_eq!(r.asin.as_deref(), Some("B0SPARSE02"));
        assert_eq!(r.subtitle, NO_SUBTITLE);
        // whole + fraction fallback
        assert_eq!(r.price, 19.99);
        assert_eq!(r.price_added, 19.99);
        assert_eq!(r.price_drop_percent, 0.0);
        assert_eq!(r.stock_status, UNKNOWN_STOCK);
        assert_eq!(r.reviews, 0);
        assert_eq!(r.needs_product, 0);
        assert_eq!(r.has_product, 0);
        assert_eq!(r.stars, None);
        assert_eq!(r.date_added, None);
        assert_eq!(r.image_url, None);
        assert_eq!(r.pattern, NO_PATTERN);
        assert_eq!(r.style, NO_STYLE);
    }

    #[test]
    fn item_without_anchor_has_no_identifier() {
        let records = extract_fixture("wishlist_page");
        let r = &records[2];
        assert_eq!(r.asin, None);
        assert_eq!(r.title, "");
        assert_eq!(r.product_link, identity::LINK_PLACEHOLDER);
        assert_eq!(r.affiliate_link, None);
        // offscreen span fallback still works for the rest of the item
        assert_eq!(r.price, 7.5);
        assert_eq!(r.reviews, 0);
    }

    #[test]
    fn blank_wishlist_name_defaults() {
        let html = std::fs::read_to_string("tests/fixtures/wishlist_page.html").unwrap();
        let doc = Html::parse_document(&html);
        let root = doc.root_element();
        let items = pair_items(&root).unwrap();
        let ctx = ItemContext {
            index: 1,
            wishlist_name: "  ",
            page_url: None,
            affiliate_tag: "prographer-20",
        };
        let r = extract_item(&items[0], &ctx);
        assert_eq!(r.wishlist_name, UNKNOWN_WISHLIST);
        // relative href stays as-is without a page URL
        assert!(r.product_link.starts_with("/Espresso-Grinder/dp/"));
    }
}
