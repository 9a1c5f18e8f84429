//! Minimal element-handle abstraction the extractors are written against.
//!
//! Extraction only ever needs to locate sub-elements and read their text or
//! attributes, so any DOM layer that can do that can feed the extractors.

use scraper::{ElementRef, Selector};

pub trait Node: Sized {
    /// First descendant matching `selector`, if any.
    fn find(&self, selector: &str) -> Option<Self>;

    /// All descendants matching `selector`, in document order.
    fn find_all(&self, selector: &str) -> Vec<Self>;

    /// Rendered text with whitespace runs collapsed to single spaces.
    fn inner_text(&self) -> String;

    fn attr(&self, name: &str) -> Option<String>;
}

impl<'a> Node for ElementRef<'a> {
    fn find(&self, selector: &str) -> Option<Self> {
        let sel = Selector::parse(selector).ok()?;
        self.select(&sel).next()
    }

    fn find_all(&self, selector: &str) -> Vec<Self> {
        match Selector::parse(selector) {
            Ok(sel) => self.select(&sel).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn inner_text(&self) -> String {
        let raw: String = self.text().collect();
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.value().attr(name).map(|v| v.to_string())
    }
}
