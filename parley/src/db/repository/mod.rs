mod collections;
mod conversations;
mod documents;

pub use collections::CollectionRepository;
pub use conversations::ConversationRepository;
pub use documents::DocumentRepository;

use chrono::{DateTime, Utc};

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
