use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{Message, MessageId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_spam: bool,
    pub spam_score: f64,
    pub description: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spam_type: Option<String>,
}

/// Partial by design of the sync cycle: a missing entry means "pending", never "not spam".
pub type ClassificationMap = HashMap<MessageId, ClassificationResult>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub spam_count: usize,
    pub non_spam_count: usize,
}

impl AggregateStats {
    pub fn from_classifications(classifications: &ClassificationMap) -> Self {
        classifications
            .values()
            .fold(Self::default(), |mut stats, result| {
                if result.is_spam {
                    stats.spam_count += 1;
                } else {
                    stats.non_spam_count += 1;
                }
                stats
            })
    }

    pub fn classified(&self) -> usize {
        self.spam_count + self.non_spam_count
    }

    pub fn pending(&self, message_count: usize) -> usize {
        message_count.saturating_sub(self.classified())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Listing,
    FetchingBodies,
    Classifying,
    Ready,
    Failed,
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SyncState::Listing | SyncState::FetchingBodies | SyncState::Classifying
        )
    }
}

/// Everything the dashboard renders. Published as a whole; never patched in place by readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub generation: u64,
    pub state: SyncState,
    pub messages: Vec<Message>,
    pub classifications: ClassificationMap,
    pub stats: AggregateStats,
    pub updated_at: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            state: SyncState::Idle,
            messages: Vec::new(),
            classifications: ClassificationMap::new(),
            stats: AggregateStats::default(),
            updated_at: Utc::now(),
        }
    }
}

impl Snapshot {
    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|message| message.id == id)
    }

    pub fn classification(&self, id: &str) -> Option<&ClassificationResult> {
        self.classifications.get(id)
    }

    pub fn pending(&self) -> usize {
        self.stats.pending(self.messages.len())
    }

    /// Drops a message together with its classification and re-derives the stats.
    pub fn remove_message(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|message| message.id != id);
        let removed = self.messages.len() != before;
        self.classifications.remove(id);
        self.refresh_stats();
        removed
    }

    pub fn refresh_stats(&mut self) {
        self.stats = AggregateStats::from_classifications(&self.classifications);
        self.updated_at = Utc::now();
    }

    /// Checks the invariants every published snapshot has to satisfy.
    pub fn is_consistent(&self) -> bool {
        let stats_match = self.stats == AggregateStats::from_classifications(&self.classifications);
        let keys_known = self
            .classifications
            .keys()
            .all(|id| self.messages.iter().any(|message| &message.id == id));
        stats_match && keys_known && self.classifications.len() <= self.messages.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub generation: u64,
    pub listed: usize,
    pub fetched: usize,
    pub classified: usize,
    pub fetch_failures: Vec<(MessageId, String)>,
    pub classification_failures: Vec<(MessageId, String)>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn result(is_spam: bool, score: f64) -> ClassificationResult {
        ClassificationResult {
            is_spam,
            spam_score: score,
            description: String::new(),
            summary: String::new(),
            spam_type: None,
        }
    }

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            from: "sender@example.com".into(),
            subject: format!("subject {id}"),
            snippet: format!("snippet {id}"),
            received_at: None,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn stats_count_every_classification_once() {
        let mut map = ClassificationMap::new();
        map.insert("a".into(), result(true, 0.9));
        map.insert("b".into(), result(false, 0.1));
        map.insert("c".into(), result(true, 0.7));

        let stats = AggregateStats::from_classifications(&map);
        assert_eq!(
            stats,
            AggregateStats {
                spam_count: 2,
                non_spam_count: 1
            }
        );
        assert_eq!(stats.classified(), map.len());
        assert_eq!(stats.pending(5), 2);
    }

    #[test]
    fn removing_a_spam_message_decrements_spam_count() {
        let mut snapshot = Snapshot {
            messages: vec![message("a"), message("b")],
            ..Snapshot::default()
        };
        snapshot.classifications.insert("a".into(), result(true, 0.9));
        snapshot.classifications.insert("b".into(), result(false, 0.2));
        snapshot.refresh_stats();
        assert_eq!(snapshot.stats.spam_count, 1);

        assert!(snapshot.remove_message("a"));
        assert!(!snapshot.contains("a"));
        assert!(snapshot.classification("a").is_none());
        assert_eq!(
            snapshot.stats,
            AggregateStats {
                spam_count: 0,
                non_spam_count: 1
            }
        );
        assert!(snapshot.is_consistent());
        assert!(!snapshot.remove_message("a"));
    }

    #[test]
    fn orphan_classification_breaks_consistency() {
        let mut snapshot = Snapshot::default();
        snapshot.classifications.insert("ghost".into(), result(false, 0.0));
        snapshot.refresh_stats();
        assert!(!snapshot.is_consistent());
    }

    #[test]
    fn classification_result_decodes_without_spam_type() {
        let json = r#"{"is_spam":false,"spam_score":0.12,"description":"fine","summary":"hi"}"#;
        let decoded: ClassificationResult = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.spam_type, None);
        assert!(!decoded.is_spam);
    }
}
