pub mod message;
pub mod types;

pub use message::{Message, MessageId, MessageRef};
pub use types::{ClassificationMap, ClassificationResult, Snapshot, SyncReport, SyncState};
