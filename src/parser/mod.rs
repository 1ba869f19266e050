pub mod extract;
pub mod order;
pub mod records;

use records::MessageRecord;

/// Two-step page pass: markup → records (document order) → newest first.
pub fn parse_channel_page(html: &str) -> Vec<MessageRecord> {
    order::newest_first(extract::extract_records(html))
}
