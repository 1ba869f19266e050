use serde::{Deserialize, Serialize};

/// One message scraped from a channel page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// 1-based position in the channel snapshot; reassigned on reorder.
    pub index: usize,
    pub post_id: Option<String>,
    pub author: Author,
    /// Plain text exactly as extracted. Never rewritten downstream.
    pub body_text: String,
    pub body_html: String,
    pub view_count: Option<ViewCount>,
    pub timestamp: Option<String>,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    pub profile_url: Option<String>,
    pub photo_url: Option<String>,
}

/// Parsed view counter, or the visible text when it has no digits at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewCount {
    Count(u64),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: Option<String>,
    pub count: Option<String>,
    pub raw_label: String,
}

/// A message the classifier kept, in its persisted shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedItem {
    pub index: usize,
    pub post_id: Option<String>,
    pub timestamp: Option<String>,
    pub author: Author,
    pub source_href: Option<String>,
    pub body_text: String,
    pub body_html: String,
    pub view_count: Option<ViewCount>,
    pub reactions: Vec<Reaction>,
}

impl From<MessageRecord> for ClassifiedItem {
    fn from(r: MessageRecord) -> Self {
        ClassifiedItem {
            index: r.index,
            post_id: r.post_id,
            timestamp: r.timestamp,
            source_href: r.author.profile_url.clone(),
            author: r.author,
            body_text: r.body_text,
            body_html: r.body_html,
            view_count: r.view_count,
            reactions: r.reactions,
        }
    }
}
