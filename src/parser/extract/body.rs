use std::sync::LazyLock;

use scraper::{ElementRef, Node, Selector};

static TEXT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tgme_widget_message_text").unwrap());

/// Returns `(text, inner_html)` of the message body, both empty when the
/// message has no text block.
pub fn extract(wrap: ElementRef) -> (String, String) {
    match wrap.select(&TEXT_SEL).next() {
        Some(block) => (block_text(block), block.inner_html()),
        None => (String::new(), String::new()),
    }
}

/// Concatenated text with `<br>` rendered as `\n`, outer whitespace trimmed.
/// Whitespace-only nodes that span a line break are markup indentation and
/// are dropped; a lone space between inline elements is kept.
fn block_text(block: ElementRef) -> String {
    let mut out = String::new();
    for node in block.descendants() {
        match node.value() {
            Node::Text(t) if is_layout_whitespace(t) => {}
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn is_layout_whitespace(text: &str) -> bool {
    text.contains('\n') && text.chars().all(char::is_whitespace)
}
