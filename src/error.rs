use std::path::PathBuf;

use thiserror::Error;

/// A page could not be fetched. The channel yields zero records and the run continues.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
}

/// An input record failed basic shape checks and was skipped.
#[derive(Debug, Error)]
pub enum MalformedInputError {
    #[error("line {line}: not an absolute http(s) URL: {value:?}")]
    InvalidChannelUrl { line: usize, value: String },
    #[error("{}: top-level JSON value is not an array", path.display())]
    NotAnArray { path: PathBuf },
    #[error("{}: cannot read: {source}", path.display())]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: unreadable JSON: {source}", path.display())]
    UnreadableJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writing or removing an output file failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot create output directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize items for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot remove stale {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The channel list is missing or empty; nothing can be fetched.
#[derive(Debug, Error)]
pub enum ChannelListError {
    #[error("channels file not found: {}", path.display())]
    Missing { path: PathBuf },
    #[error("cannot read channels file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no channels found in {}", path.display())]
    Empty { path: PathBuf },
}
