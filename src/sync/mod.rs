mod orchestrator;
mod store;

pub use orchestrator::{SyncError, SyncOrchestrator, SyncOutcome};
pub use store::SnapshotStore;
