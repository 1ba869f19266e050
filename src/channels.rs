use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

use crate::error::{ChannelListError, MalformedInputError};

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w]+").unwrap());
static REPEATED_SEP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());

const FALLBACK_NAME: &str = "channel";

/// One channel to scrape and the file-safe name its output is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub url: String,
    pub base_name: String,
}

impl ChannelTarget {
    pub fn new(url: &str) -> Self {
        ChannelTarget {
            url: url.to_string(),
            base_name: base_name_from_url(url),
        }
    }

    pub fn output_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}.json", self.base_name))
    }
}

/// Read the channel list. Blank lines and `#` comments are ignored; lines
/// that are not http(s) URLs are skipped with a warning. A missing file or an
/// empty list is an error: nothing can run without channels.
pub fn load_channel_list(path: &Path) -> Result<Vec<ChannelTarget>, ChannelListError> {
    if !path.exists() {
        return Err(ChannelListError::Missing {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| ChannelListError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut targets = Vec::new();
    for (i, line) in text.lines().enumerate() {
        match parse_channel_line(i + 1, line) {
            Ok(Some(target)) => targets.push(target),
            Ok(None) => {}
            Err(e) => warn!(file = %path.display(), error = %e, "Skipping channel line"),
        }
    }

    if targets.is_empty() {
        return Err(ChannelListError::Empty {
            path: path.to_path_buf(),
        });
    }
    warn_on_shared_names(&targets);
    Ok(targets)
}

fn parse_channel_line(
    line_no: usize,
    line: &str,
) -> Result<Option<ChannelTarget>, MalformedInputError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    match Url::parse(line) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.has_host() => {
            Ok(Some(ChannelTarget::new(line)))
        }
        _ => Err(MalformedInputError::InvalidChannelUrl {
            line: line_no,
            value: line.to_string(),
        }),
    }
}

fn warn_on_shared_names(targets: &[ChannelTarget]) {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for t in targets {
        if let Some(first) = seen.insert(&t.base_name, &t.url) {
            warn!(
                name = %t.base_name,
                first = first,
                url = %t.url,
                "Channels share an output name; the later one overwrites the earlier"
            );
        }
    }
}

/// Last path segment (or the host, for a bare domain), lowercased, with runs
/// of non-word characters collapsed to `_` and outer `_` trimmed.
pub fn base_name_from_url(url: &str) -> String {
    let url = url.trim();
    let raw = match Url::parse(url) {
        Ok(u) => {
            let path = u.path().trim_end_matches('/');
            match path.rsplit('/').next().filter(|s| !s.is_empty()) {
                Some(segment) => segment.to_string(),
                None => u.host_str().unwrap_or("").to_string(),
            }
        }
        // not absolute: treat the whole string as a path
        Err(_) => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string(),
    };

    let lowered = raw.to_lowercase();
    let replaced = NON_WORD_RE.replace_all(&lowered, "_");
    let collapsed = REPEATED_SEP_RE.replace_all(&replaced, "_");
    let name = collapsed.trim_matches('_');
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

// ── Tests ──
