use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::joined_text;
use crate::parser::records::ViewCount;

static VIEWS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.tgme_widget_message_views").unwrap());

pub fn extract(wrap: ElementRef) -> Option<ViewCount> {
    let el = wrap.select(&VIEWS_SEL).next()?;
    parse_view_count(&joined_text(el, " "))
}

/// Digits of the visible counter as an integer. Text with no digits (or too
/// many to fit) is kept verbatim; empty text means no counter.
pub fn parse_view_count(visible: &str) -> Option<ViewCount> {
    if visible.is_empty() {
        return None;
    }
    let digits: String = visible.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u64>() {
        Ok(n) => Some(ViewCount::Count(n)),
        Err(_) => Some(ViewCount::Raw(visible.to_string())),
    }
}
