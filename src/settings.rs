use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_NAME: &str = "channel_scraper";
const ENV_PREFIX: &str = "SCRAPER";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/120 Safari/537.36";

/// Run-wide settings: defaults, then optional file, then `SCRAPER_*` env vars.
/// CLI flags are applied on top by `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub channels_file: PathBuf,
    pub out_dir: PathBuf,
    pub delay_secs: f64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub workers: usize,
    pub classifier: ClassifierSettings,
}

/// Tuning for the config classifier. The two numeric knobs are empirical;
/// they are exposed so they can be adjusted without a rebuild.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Scheme names that count as a direct hit when followed by `://`.
    pub schemes: Vec<String>,
    /// Keywords looked for inside and around plain-HTTP links.
    pub keywords: Vec<String>,
    /// Characters inspected on each side of a plain-HTTP link.
    pub context_window: usize,
    /// Shortest base64-alphabet run treated as an embedded payload.
    pub base64_min_len: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            channels_file: PathBuf::from("channels.txt"),
            out_dir: PathBuf::from("raws"),
            delay_secs: 3.0,
            timeout_secs: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            workers: 1,
            classifier: ClassifierSettings::default(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        let owned = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        ClassifierSettings {
            schemes: owned(&["vmess", "ss", "socks", "vless", "trojan", "wireguard", "hysteria2"]),
            keywords: owned(&["vmess", "vless", "trojan", "ss", "socks", "hysteria", "wireguard"]),
            context_window: 50,
            base64_min_len: 40,
        }
    }
}

impl Settings {
    /// Load layered settings. An explicit `path` must exist; the default
    /// `channel_scraper.{toml,json,yaml}` is optional.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("classifier.schemes")
                    .with_list_parse_key("classifier.keywords"),
            )
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")?;

        settings.validated()
    }

    /// Reject values that would make the run misbehave; normalise the rest.
    pub fn validated(mut self) -> Result<Settings> {
        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            bail!("delay_secs must be a non-negative number, got {}", self.delay_secs);
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        if self.workers == 0 {
            self.workers = 1;
        }
        Ok(self)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Tests ──
