pub mod author;
pub mod body;
pub mod reactions;
pub mod views;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::records::MessageRecord;

static HISTORY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("section.tgme_channel_history.js-message_history").unwrap());
static WRAP_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.tgme_widget_message_wrap.js-widget_message_wrap").unwrap());
static MESSAGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.tgme_widget_message").unwrap());
static TIME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("time").unwrap());

/// Parse a channel page into records, in document order, indexed from 1.
///
/// Wrappers are looked up inside the channel-history section when the page
/// has one, otherwise across the whole document. Missing pieces of a message
/// leave the matching field empty; they never drop the record.
pub fn extract_records(html: &str) -> Vec<MessageRecord> {
    let document = Html::parse_document(html);

    let wrappers: Vec<ElementRef> = match document.select(&HISTORY_SEL).next() {
        Some(section) => section.select(&WRAP_SEL).collect(),
        None => {
            debug!("Channel history section not found; searching whole document");
            document.select(&WRAP_SEL).collect()
        }
    };

    wrappers
        .into_iter()
        .enumerate()
        .map(|(i, wrap)| extract_one(i + 1, wrap))
        .collect()
}

fn extract_one(index: usize, wrap: ElementRef) -> MessageRecord {
    let post_id = wrap
        .select(&MESSAGE_SEL)
        .next()
        .and_then(|m| m.value().attr("data-post"))
        .map(str::to_string);

    let (body_text, body_html) = body::extract(wrap);

    let timestamp = wrap
        .select(&TIME_SEL)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(str::to_string);

    MessageRecord {
        index,
        post_id,
        author: author::extract(wrap),
        body_text,
        body_html,
        view_count: views::extract(wrap),
        timestamp,
        reactions: reactions::extract(wrap),
    }
}

/// Text of an element with each fragment trimmed, empties dropped, joined by `sep`.
pub(crate) fn joined_text(el: ElementRef, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

// ── Tests ──
