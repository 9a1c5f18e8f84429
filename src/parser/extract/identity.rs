use url::Url;

use crate::parser::dom::Node;

pub const LINK_PLACEHOLDER: &str = "javascript:void(0)";
const ASIN_MARKER: &str = "dp/";
const ANCHOR_SELECTOR: &str = "a.a-link-normal";

pub struct Identity {
    pub asin: Option<String>,
    pub title: String,
    pub link: String,
}

impl Identity {
    fn missing() -> Self {
        Identity {
            asin: None,
            title: String::new(),
            link: LINK_PLACEHOLDER.to_string(),
        }
    }
}

/// ASIN, title and product link from the item heading's anchor.
pub fn identity<N: Node>(title_node: &N, page_url: Option<&Url>) -> Identity {
    let Some(anchor) = title_node.find(ANCHOR_SELECTOR) else {
        return Identity::missing();
    };
    let Some(href) = anchor.attr("href") else {
        return Identity::missing();
    };
    let link = resolve(&href, page_url);
    let Some(asin) = asin_from_link(&link) else {
        return Identity::missing();
    };
    let title = anchor
        .attr("title")
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    Identity {
        asin: Some(asin),
        title,
        link,
    }
}

/// The path segment following the last `dp/`.
pub fn asin_from_link(link: &str) -> Option<String> {
    let (_, rest) = link.rsplit_once(ASIN_MARKER)?;
    let asin = rest.split(['/', '?', '#']).next().unwrap_or("");
    if asin.is_empty() {
        None
    } else {
        Some(asin.to_string())
    }
}

pub fn affiliate_link(link: &str, tag: &str) -> String {
    let sep = if link.contains('?') { '&' } else { '?' };
    format!("{}{}linkCode=ll1&tag={}", link, sep, tag)
}

/// Maker/author line, with the leading "by " dropped.
pub fn subtitle<N: Node>(details: &N) -> Option<String> {
    let text = details.find(r#"span[id^="item-byline"]"#)?.inner_text();
    let text = text.strip_prefix("by ").unwrap_or(&text).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub fn image_url<N: Node>(details: &N, page_url: Option<&Url>) -> Option<String> {
    let src = details.find("a.a-link-normal img")?.attr("src")?;
    let src = src.trim();
    if src.is_empty() {
        None
    } else {
        Some(resolve(src, page_url))
    }
}

fn resolve(href: &str, page_url: Option<&Url>) -> String {
    page_url
        .and_then(|base| base.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}
