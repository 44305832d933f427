use serde::Serialize;

/// Prefix of the per-event notification tag. Devices collapse notifications
/// sharing a tag, so repeated cycles for one event show up once.
pub const DEDUPE_TAG_PREFIX: &str = "disaster-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub target_token: String,
    pub title: String,
    pub body: String,
    pub dedupe_tag: String,
    pub event_id: String,
    pub danger_score: u8,
}

pub fn dedupe_tag(event_id: &str) -> String {
    format!("{}{}", DEDUPE_TAG_PREFIX, event_id)
}
