use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::classifier::Classifier;
use crate::error::MalformedInputError;
use crate::output::{reconcile_output, OutputOutcome};

const CONFIG_SUFFIX: &str = "_config.json";

/// A retained message in the reclassified output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub body_text: String,
    pub source_href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclassifySummary {
    pub files: usize,
    pub skipped: usize,
    pub matches: usize,
    pub written: usize,
    pub removed: usize,
    pub persistence_failures: usize,
}

enum FileResult {
    Skipped,
    Done { matches: usize, outcome: OutputOutcome },
    PersistFailed,
}

/// Classify every message in the JSON arrays under `indir` again and write
/// `<stem>_config.json` per input file into `outdir`.
pub fn run(indir: &Path, outdir: &Path, classifier: &Classifier) -> Result<ReclassifySummary> {
    if !indir.is_dir() {
        bail!("Input directory not found: {}", indir.display());
    }
    std::fs::create_dir_all(outdir)
        .with_context(|| format!("Failed to create {}", outdir.display()))?;

    let files = list_inputs(indir)?;
    if files.is_empty() {
        info!(dir = %indir.display(), "No JSON files to reclassify");
        return Ok(ReclassifySummary::default());
    }

    let results: Vec<FileResult> = files
        .par_iter()
        .map(|path| reclassify_file(path, outdir, classifier))
        .collect();

    let mut summary = ReclassifySummary {
        files: files.len(),
        ..Default::default()
    };
    for r in results {
        match r {
            FileResult::Skipped => summary.skipped += 1,
            FileResult::PersistFailed => summary.persistence_failures += 1,
            FileResult::Done { matches, outcome } => {
                summary.matches += matches;
                match outcome {
                    OutputOutcome::Written { .. } => summary.written += 1,
                    OutputOutcome::Removed { .. } => summary.removed += 1,
                    OutputOutcome::Untouched => {}
                }
            }
        }
    }

    info!(matches = summary.matches, files = summary.files, "Reclassification finished");
    Ok(summary)
}

/// `*.json` files directly in `dir`, sorted by name, excluding our own output.
fn list_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            name.ends_with(".json") && !name.ends_with(CONFIG_SUFFIX)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn reclassify_file(path: &Path, outdir: &Path, classifier: &Classifier) -> FileResult {
    let entries = match load_array(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Skipping input file");
            return FileResult::Skipped;
        }
    };

    let configs = select_entries(&entries, classifier);
    let out_path = outdir.join(config_file_name(path));
    match reconcile_output(&out_path, &configs) {
        Ok(outcome) => FileResult::Done {
            matches: configs.len(),
            outcome,
        },
        Err(e) => {
            error!(file = %path.display(), error = %e, "Failed to update config file");
            FileResult::PersistFailed
        }
    }
}

fn config_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}{}", stem, CONFIG_SUFFIX)
}

pub fn load_array(path: &Path) -> Result<Vec<Value>, MalformedInputError> {
    let text = std::fs::read_to_string(path).map_err(|source| MalformedInputError::UnreadableFile {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value =
        serde_json::from_str(&text).map_err(|source| MalformedInputError::UnreadableJson {
            path: path.to_path_buf(),
            source,
        })?;
    match value {
        Value::Array(entries) => Ok(entries),
        _ => Err(MalformedInputError::NotAnArray {
            path: path.to_path_buf(),
        }),
    }
}

/// Entries whose body classifies as a config. Accepts current `bodyText` /
/// `author.profileUrl` fields and the older `message_text` / `message` /
/// `author.href` ones; anything else is passed over.
pub fn select_entries(entries: &[Value], classifier: &Classifier) -> Vec<ConfigEntry> {
    entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let body = ["bodyText", "message_text", "message"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))?;
            if !classifier.classify(body) {
                return None;
            }
            let source_href = obj
                .get("author")
                .and_then(Value::as_object)
                .and_then(|a| {
                    a.get("profileUrl")
                        .and_then(Value::as_str)
                        .or_else(|| a.get("href").and_then(Value::as_str))
                })
                .map(str::to_string);
            Some(ConfigEntry {
                body_text: body.to_string(),
                source_href,
            })
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entries_by_field_name() {
        let entries = vec![
            json!({"bodyText": "vmess://a", "author": {"profileUrl": "https://t.me/a"}}),
            json!({"message_text": "trojan://b", "author": {"href": "https://t.me/b"}}),
            json!({"message": "ss://c", "author": "not an object"}),
            json!({"bodyText": "plain words"}),
            json!({"bodyText": 42}),
            json!("vmess://not-an-object"),
        ];
        let got = select_entries(&entries, &Classifier::default());
        assert_eq!(
            got,
            vec![
                ConfigEntry {
                    body_text: "vmess://a".into(),
                    source_href: Some("https://t.me/a".into())
                },
                ConfigEntry {
                    body_text: "trojan://b".into(),
                    source_href: Some("https://t.me/b".into())
                },
                ConfigEntry {
                    body_text: "ss://c".into(),
                    source_href: None
                },
            ]
        );
    }

    #[test]
    fn non_string_href_is_null() {
        let entries = vec![json!({"bodyText": "vless://x", "author": {"profileUrl": 7}})];
        let got = select_entries(&entries, &Classifier::default());
        assert_eq!(got[0].source_href, None);
    }

    #[test]
    fn directory_pass() {
        let indir = tempfile::tempdir().unwrap();
        let outdir = tempfile::tempdir().unwrap();

        std::fs::write(
            indir.path().join("alpha.json"),
            json!([{"bodyText": "  vmess://keep-spacing  "}, {"bodyText": "hi"}]).to_string(),
        )
        .unwrap();
        std::fs::write(indir.path().join("beta.json"), json!([{"bodyText": "hi"}]).to_string())
            .unwrap();
        std::fs::write(indir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(indir.path().join("object.json"), "{}").unwrap();
        std::fs::write(indir.path().join("notes.txt"), "vmess://ignored").unwrap();
        // stale output for beta, which no longer matches
        std::fs::write(outdir.path().join("beta_config.json"), "[]").unwrap();

        let summary = run(indir.path(), outdir.path(), &Classifier::default()).unwrap();
        assert_eq!(summary.files, 4);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.matches, 1);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.removed, 1);

        let text = std::fs::read_to_string(outdir.path().join("alpha_config.json")).unwrap();
        let got: Vec<ConfigEntry> = serde_json::from_str(&text).unwrap();
        assert_eq!(got[0].body_text, "  vmess://keep-spacing  ");
        assert!(!outdir.path().join("beta_config.json").exists());
    }

    #[test]
    fn own_output_is_not_reread() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("chan.json"),
            json!([{"bodyText": "vmess://a"}]).to_string(),
        )
        .unwrap();

        run(dir.path(), dir.path(), &Classifier::default()).unwrap();
        let again = run(dir.path(), dir.path(), &Classifier::default()).unwrap();
        assert_eq!(again.files, 1);
        assert!(!dir.path().join("chan_config_config.json").exists());
    }

    #[test]
    fn missing_input_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        assert!(run(&dir.path().join("absent"), &out, &Classifier::default()).is_err());
    }
}
