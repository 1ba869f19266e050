use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

use super::joined_text;
use crate::parser::records::Reaction;

static REACTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tgme_reaction").unwrap());
static EMOJI_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("i.emoji b").unwrap());
static TRAILING_DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)$").unwrap());

pub fn extract(wrap: ElementRef) -> Vec<Reaction> {
    wrap.select(&REACTION_SEL).map(parse_reaction).collect()
}

fn parse_reaction(el: ElementRef) -> Reaction {
    let raw_label = joined_text(el, "");
    let emoji = el
        .select(&EMOJI_SEL)
        .next()
        .map(|b| joined_text(b, ""))
        .filter(|e| !e.is_empty());
    let count = split_count(&raw_label, emoji.as_deref());

    Reaction {
        emoji,
        count,
        raw_label,
    }
}

/// Count part of a reaction label. With a known glyph, everything but the
/// glyph; otherwise the trailing run of digits.
pub fn split_count(label: &str, emoji: Option<&str>) -> Option<String> {
    let rest = match emoji {
        Some(glyph) => label.replace(glyph, "").trim().to_string(),
        None => TRAILING_DIGITS_RE.captures(label)?[1].to_string(),
    };
    (!rest.is_empty()).then_some(rest)
}
