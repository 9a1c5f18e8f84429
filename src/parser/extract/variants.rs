use crate::parser::dom::Node;

#[derive(Debug, Default, PartialEq)]
pub struct Variants {
    pub pattern: Option<String>,
    pub style: Option<String>,
}

/// Pattern and style from the variation ("twister") lines of an item.
/// Every labelled line replaces the earlier value; one without a `:` value
/// clears it.
pub fn pattern_and_style<N: Node>(details: &N) -> Variants {
    let mut found = Variants::default();
    for node in details.find_all(r#"span[id^="twisterText"]"#) {
        let text = node.inner_text();
        if text.contains("Pattern Name") {
            found.pattern = trailing_value(&text);
        }
        if text.contains("Style") {
            found.style = trailing_value(&text);
        }
    }
    found
}

/// Last `:`-separated segment of a labelled line.
fn trailing_value(text: &str) -> Option<String> {
    let (_, value) = text.rsplit_once(':')?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
