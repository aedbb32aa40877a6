use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::domain::{ClassificationMap, ClassificationResult, Message, MessageId, Snapshot, SyncState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// The completion belongs to a superseded generation.
    Stale,
    /// The message left the snapshot before its verdict arrived.
    Missing,
    /// A verdict for this message is already stored for the current cycle.
    Duplicate,
}

struct StoreInner {
    generation: u64,
    snapshot: Snapshot,
    /// Ids removed by user actions since the current generation began.
    tombstones: HashSet<MessageId>,
}

/// The single shared mutable resource. Every mutation happens under one lock and
/// ends with exactly one publish, so subscribers only ever see whole snapshots.
pub struct SnapshotStore {
    inner: Mutex<StoreInner>,
    publisher: watch::Sender<Arc<Snapshot>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        let snapshot = Snapshot::default();
        let (publisher, _) = watch::channel(Arc::new(snapshot.clone()));
        Self {
            inner: Mutex::new(StoreInner {
                generation: 0,
                snapshot,
                tombstones: HashSet::new(),
            }),
            publisher,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.publisher.subscribe()
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.publisher.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    /// Starts a new generation. Everything tagged with an older one is discarded from now on.
    pub fn begin_cycle(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.tombstones.clear();
        inner.snapshot.generation = inner.generation;
        inner.snapshot.state = SyncState::Listing;
        self.publish(&mut inner);
        inner.generation
    }

    pub fn set_state(&self, generation: u64, state: SyncState) -> bool {
        self.with_generation(generation, |snapshot| snapshot.state = state)
    }

    /// Replaces the message list wholesale and clears classifications.
    /// Returns the messages that actually made it into the snapshot.
    pub fn publish_messages(&self, generation: u64, messages: Vec<Message>) -> Option<Vec<Message>> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }

        let messages: Vec<Message> = messages
            .into_iter()
            .filter(|message| !inner.tombstones.contains(&message.id))
            .collect();

        inner.snapshot.state = if messages.is_empty() {
            SyncState::Ready
        } else {
            SyncState::Classifying
        };
        inner.snapshot.messages = messages.clone();
        inner.snapshot.classifications = ClassificationMap::new();
        self.publish(&mut inner);
        Some(messages)
    }

    pub fn merge_classification(
        &self,
        generation: u64,
        id: &str,
        result: ClassificationResult,
    ) -> MergeOutcome {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return MergeOutcome::Stale;
        }
        if !inner.snapshot.contains(id) {
            return MergeOutcome::Missing;
        }
        if inner.snapshot.classifications.contains_key(id) {
            return MergeOutcome::Duplicate;
        }
        inner.snapshot.classifications.insert(id.to_string(), result);
        self.publish(&mut inner);
        MergeOutcome::Merged
    }

    pub fn fail_cycle(&self, generation: u64) -> bool {
        self.set_state(generation, SyncState::Failed)
    }

    pub fn finish_cycle(&self, generation: u64) -> bool {
        self.set_state(generation, SyncState::Ready)
    }

    /// Removes a message after a successful user action. Also shields the running
    /// cycle from re-adding it.
    pub fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.tombstones.insert(id.to_string());
        let removed = inner.snapshot.remove_message(id);
        if removed {
            self.publish(&mut inner);
        }
        removed
    }

    /// Invalidates every in-flight generation and clears all state.
    pub fn reset(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.tombstones.clear();
        inner.snapshot = Snapshot {
            generation: inner.generation,
            ..Snapshot::default()
        };
        self.publish(&mut inner);
        inner.generation
    }

    fn with_generation(&self, generation: u64, apply: impl FnOnce(&mut Snapshot)) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        apply(&mut inner.snapshot);
        self.publish(&mut inner);
        true
    }

    fn publish(&self, inner: &mut StoreInner) {
        inner.snapshot.refresh_stats();
        debug_assert!(inner.snapshot.is_consistent());
        self.publisher.send_replace(Arc::new(inner.snapshot.clone()));
    }
}
