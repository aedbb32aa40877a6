use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MessageId = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: MessageId,
}

impl MessageRef {
    pub fn new(id: impl Into<MessageId>) -> Self {
        Self { id: id.into() }
    }
}

/// A fetched unread message. Never mutated after the gateway hands it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub received_at: Option<DateTime<Utc>>,
    /// Full provider payload as returned by the gateway.
    pub raw: serde_json::Value,
}
