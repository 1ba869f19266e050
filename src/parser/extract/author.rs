use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::joined_text;
use crate::parser::records::Author;

static OWNER_NAME_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tgme_widget_message_owner_name").unwrap());
static USER_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tgme_widget_message_user a").unwrap());
static USER_IMG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".tgme_widget_message_user img").unwrap());

pub fn extract(wrap: ElementRef) -> Author {
    let name = wrap
        .select(&OWNER_NAME_SEL)
        .next()
        .map(|el| joined_text(el, " "))
        .unwrap_or_default();

    let profile_url = first_attr(wrap, &USER_LINK_SEL, "href");
    let photo_url = first_attr(wrap, &USER_IMG_SEL, "src");

    Author {
        name,
        profile_url,
        photo_url,
    }
}

fn first_attr(wrap: ElementRef, sel: &Selector, attr: &str) -> Option<String> {
    wrap.select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}
