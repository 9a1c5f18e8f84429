use std::sync::LazyLock;

use regex::Regex;

use crate::parser::dom::Node;

static DOTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.+").unwrap());
static WAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"was \$([\d,]+\.?\d*)").unwrap());
static DROP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Price dropped (\d+)%").unwrap());

/// Reduce a raw price string to a number.
///
/// Everything but digits and dots is removed, runs of dots become one, and
/// only the first decimal point is honoured: `"12.34.56"` reads as `12.34`.
pub fn clean_price(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let collapsed = DOTS_RE.replace_all(&kept, ".");

    let mut parts = collapsed.splitn(3, '.');
    let whole = parts.next().unwrap_or("");
    let cleaned = match parts.next() {
        Some(frac) => format!("{}.{}", whole, frac),
        None => whole.to_string(),
    };
    if cleaned.is_empty() || cleaned == "." {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Current price, first usable candidate wins:
/// `data-price`, then the screen-reader price, then whole + fraction spans.
pub fn current_price<N: Node>(details: &N) -> Option<f64> {
    let candidates: [&dyn Fn() -> Option<String>; 3] = [
        &|| details.attr("data-price"),
        &|| {
            details
                .find("span.a-price > span.a-offscreen")
                .map(|n| n.inner_text())
        },
        &|| {
            let whole = details.find("span.a-price-whole")?.inner_text();
            let fraction = details.find("span.a-price-fraction")?.inner_text();
            if whole.is_empty() || fraction.is_empty() {
                return None;
            }
            Some(format!("{}.{}", whole, fraction))
        },
    ];
    candidates
        .iter()
        .find_map(|candidate| candidate().and_then(|raw| clean_price(&raw)))
}

#[derive(Debug, Default, PartialEq)]
pub struct PriceDrop {
    /// Price when the item was added, from "was $N".
    pub was: Option<f64>,
    /// "Price dropped N%" as a fraction in [0, 1].
    pub percent: Option<f64>,
}

pub fn price_drop<N: Node>(details: &N) -> PriceDrop {
    details
        .find(".a-row.itemPriceDrop")
        .map(|n| parse_price_drop(&n.inner_text()))
        .unwrap_or_default()
}

pub fn parse_price_drop(text: &str) -> PriceDrop {
    let was = WAS_RE
        .captures(text)
        .and_then(|c| clean_price(&c[1]));
    let percent = DROP_RE
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|p| (p / 100.0).clamp(0.0, 1.0));
    PriceDrop { was, percent }
}
