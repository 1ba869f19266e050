use std::fmt;
use std::sync::LazyLock;

use regex::{Match, Regex};

use crate::settings::ClassifierSettings;

/// Plain-HTTP links only. `https://` is never inspected.
static HTTP_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bhttp://[^\s'"<>]+"#).unwrap());

/// Which check recognised a message as carrying a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// `scheme://` for a scheme on the allow-list.
    DirectScheme,
    /// A plain-HTTP link whose text names a scheme keyword.
    LinkKeyword,
    /// A plain-HTTP link carrying a long base64 run.
    LinkBase64,
    /// A keyword or base64 run close to a plain-HTTP link.
    LinkContext,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::DirectScheme => "direct scheme",
            Signal::LinkKeyword => "keyword in http link",
            Signal::LinkBase64 => "base64 in http link",
            Signal::LinkContext => "keyword or base64 near http link",
        };
        f.write_str(s)
    }
}

type Stage = fn(&Classifier, &str) -> Option<Signal>;

/// Evaluated left to right; the first stage to return a signal wins.
const STAGES: [Stage; 2] = [Classifier::direct_scheme, Classifier::plain_http_links];

/// Decides whether a message body carries a proxy configuration URI.
#[derive(Debug, Clone)]
pub struct Classifier {
    direct: Option<Regex>,
    keyword: Option<Regex>,
    base64: Regex,
    context_window: usize,
}

impl Classifier {
    pub fn new(settings: &ClassifierSettings) -> Result<Classifier, regex::Error> {
        let direct = alternation(&settings.schemes)
            .map(|alt| Regex::new(&format!(r"(?i)\b({})://", alt)))
            .transpose()?;
        let keyword = alternation(&settings.keywords)
            .map(|alt| Regex::new(&format!("(?i)({})", alt)))
            .transpose()?;
        let base64 = Regex::new(&format!(
            "[A-Za-z0-9+/]{{{},}}={{0,2}}",
            settings.base64_min_len.max(1)
        ))?;

        Ok(Classifier {
            direct,
            keyword,
            base64,
            context_window: settings.context_window,
        })
    }

    pub fn classify(&self, body: &str) -> bool {
        self.detect(body).is_some()
    }

    /// The signal that fired for `body`, if any.
    pub fn detect(&self, body: &str) -> Option<Signal> {
        if body.is_empty() {
            return None;
        }
        STAGES.iter().find_map(|stage| stage(self, body))
    }

    fn direct_scheme(&self, body: &str) -> Option<Signal> {
        let rx = self.direct.as_ref()?;
        rx.is_match(body).then_some(Signal::DirectScheme)
    }

    fn plain_http_links(&self, body: &str) -> Option<Signal> {
        HTTP_LINK_RE
            .find_iter(body)
            .find_map(|m| self.inspect_link(body, m))
    }

    fn inspect_link(&self, body: &str, link: Match) -> Option<Signal> {
        let url = link.as_str();
        if self.has_keyword(url) {
            return Some(Signal::LinkKeyword);
        }
        if self.base64.is_match(url) {
            return Some(Signal::LinkBase64);
        }
        let around = char_window(body, link.start(), link.end(), self.context_window);
        (self.has_keyword(around) || self.base64.is_match(around)).then_some(Signal::LinkContext)
    }

    fn has_keyword(&self, text: &str) -> bool {
        self.keyword.as_ref().is_some_and(|rx| rx.is_match(text))
    }
}

#[cfg(test)]
impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(&ClassifierSettings::default()).expect("default patterns are valid")
    }
}

fn alternation(words: &[String]) -> Option<String> {
    let escaped: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    (!escaped.is_empty()).then(|| escaped.join("|"))
}

/// `body[start..end]` widened by up to `radius` characters on each side.
fn char_window(body: &str, start: usize, end: usize, radius: usize) -> &str {
    let from = body[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(start, |(i, _)| i);
    let to = body[end..]
        .char_indices()
        .nth(radius)
        .map_or(body.len(), |(i, _)| end + i);
    &body[from..to]
}

// ── Tests ──
