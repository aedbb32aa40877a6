use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use futures::{stream, StreamExt};
use thiserror::Error;
use tokio::{sync::watch, time::sleep};

use crate::{
    ai::SpamClassifier,
    auth::{AuthError, Profile, Session, SessionManager},
    config::SyncConfig,
    domain::{Message, MessageId, MessageRef, Snapshot, SyncReport, SyncState},
    gmail::{GatewayError, ListFilter, MailGateway},
};

use super::store::{MergeOutcome, SnapshotStore};

const FETCH_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to list unread messages: {0}")]
    List(#[source] GatewayError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// A newer cycle (or a sign-out) took over; this cycle's results were discarded.
    Superseded { generation: u64 },
}

pub struct SyncOrchestrator {
    gateway: Arc<dyn MailGateway>,
    classifier: Arc<dyn SpamClassifier>,
    sessions: Arc<SessionManager>,
    store: Arc<SnapshotStore>,
    filter: ListFilter,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn MailGateway>,
        classifier: Arc<dyn SpamClassifier>,
        sessions: Arc<SessionManager>,
        store: Arc<SnapshotStore>,
        filter: ListFilter,
        config: SyncConfig,
    ) -> Self {
        Self {
            gateway,
            classifier,
            sessions,
            store,
            filter,
            config,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    /// Only valid while signed out; switching accounts goes through [`Self::sign_out`] so the
    /// previous account's snapshot is cleared first.
    pub async fn sign_in(&self, access_token: &str) -> Result<Profile, AuthError> {
        let attempt = self.sessions.begin(access_token)?;
        match self.gateway.profile(&attempt.session).await {
            Ok(profile) => {
                if !self.sessions.complete(attempt, profile.clone()) {
                    return Err(AuthError::SignedOut);
                }
                tracing::info!(target: "auth", account = %profile.email_address, "signed in");
                Ok(profile)
            }
            Err(err) => {
                self.sessions.fail(&attempt);
                tracing::warn!(target: "auth", error = %err, "sign-in rejected");
                Err(AuthError::Rejected(err))
            }
        }
    }

    /// Signs out, supersedes every running cycle and clears the snapshot.
    pub fn sign_out(&self) {
        let was_active = self.sessions.sign_out();
        let generation = self.store.reset();
        tracing::info!(target: "auth", was_active, generation, "signed out");
    }

    /// Runs one sync cycle. Progress is published through [`Self::subscribe`]; the returned
    /// future resolves once every fetch and classification of this cycle has settled.
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        let session = self.sessions.current()?;
        let generation = self.store.begin_cycle();
        tracing::info!(target: "sync", generation, "sync cycle started");

        let refs = match self.gateway.list_unread(&session, &self.filter).await {
            Ok(refs) => refs,
            Err(err) => return self.abort_cycle(generation, &session, err),
        };

        if !self.store.set_state(generation, SyncState::FetchingBodies) {
            return Ok(self.superseded(generation));
        }
        let refs = dedup_refs(refs);
        let listed = refs.len();
        let (messages, fetch_failures) = self.fetch_bodies(&session, generation, &refs).await;

        let Some(messages) = self.store.publish_messages(generation, messages) else {
            return Ok(self.superseded(generation));
        };
        tracing::info!(
            target: "sync",
            generation,
            listed,
            fetched = messages.len(),
            failed = fetch_failures.len(),
            "message bodies published"
        );

        let fetched = messages.len();
        let (classified, classification_failures) = self.classify_all(generation, messages).await;

        if !self.store.finish_cycle(generation) {
            return Ok(self.superseded(generation));
        }

        let report = SyncReport {
            generation,
            listed,
            fetched,
            classified,
            fetch_failures,
            classification_failures,
        };
        let stats = self.store.current().stats;
        tracing::info!(
            target: "sync",
            generation,
            classified,
            spam = stats.spam_count,
            non_spam = stats.non_spam_count,
            "sync cycle completed"
        );
        Ok(SyncOutcome::Completed(report))
    }

    fn abort_cycle(
        &self,
        generation: u64,
        session: &Session,
        err: GatewayError,
    ) -> Result<SyncOutcome, SyncError> {
        if !self.store.fail_cycle(generation) {
            tracing::debug!(target: "sync", generation, error = %err, "listing failed after cycle was superseded");
            return Ok(self.superseded(generation));
        }
        tracing::warn!(target: "sync", generation, error = %err, "listing unread messages failed");
        if err.is_unauthorized() {
            self.sessions.expire(session);
            return Err(SyncError::Auth(AuthError::Expired(err)));
        }
        Err(SyncError::List(err))
    }

    fn superseded(&self, generation: u64) -> SyncOutcome {
        tracing::info!(
            target: "sync",
            generation,
            current = self.store.generation(),
            "sync cycle superseded; discarding its results"
        );
        SyncOutcome::Superseded { generation }
    }

    async fn fetch_bodies(
        &self,
        session: &Session,
        generation: u64,
        refs: &[MessageRef],
    ) -> (Vec<Message>, Vec<(MessageId, String)>) {
        let ids: Vec<MessageId> = refs.iter().map(|message_ref| message_ref.id.clone()).collect();
        let results: Vec<(MessageId, Result<Message, GatewayError>)> = stream::iter(ids)
            .map(move |id| async move {
                let outcome = self.fetch_with_retry(session, generation, &id).await;
                (id, outcome)
            })
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        let mut fetched: HashMap<MessageId, Message> = HashMap::with_capacity(results.len());
        let mut failures = Vec::new();
        for (id, outcome) in results {
            match outcome {
                Ok(message) if message.id == id => {
                    fetched.insert(id, message);
                }
                Ok(message) => {
                    tracing::warn!(target: "sync", requested = %id, returned = %message.id, "provider returned a different message; dropping it");
                    failures.push((id, format!("provider returned message {}", message.id)));
                }
                Err(err) => {
                    tracing::warn!(target: "sync", generation, id = %id, error = %err, "failed to fetch message body; dropping it");
                    failures.push((id, err.to_string()));
                }
            }
        }

        let messages = refs
            .iter()
            .filter_map(|message_ref| fetched.remove(&message_ref.id))
            .collect();
        (messages, failures)
    }

    async fn fetch_with_retry(
        &self,
        session: &Session,
        generation: u64,
        id: &str,
    ) -> Result<Message, GatewayError> {
        let mut delay = FETCH_BACKOFF;
        let mut attempt = 0;
        loop {
            match self.gateway.get_message(session, id).await {
                Ok(message) => return Ok(message),
                Err(err)
                    if err.is_retryable()
                        && attempt < self.config.fetch_retries
                        && self.store.is_current(generation) =>
                {
                    attempt += 1;
                    tracing::debug!(target: "sync", id, attempt, error = %err, "retrying message fetch");
                    sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn classify_all(
        &self,
        generation: u64,
        messages: Vec<Message>,
    ) -> (usize, Vec<(MessageId, String)>) {
        let classifier = self.classifier.as_ref();
        let mut completions = stream::iter(messages)
            .map(move |message| async move {
                let outcome = classifier.classify(&message.snippet).await;
                (message.id, outcome)
            })
            .buffer_unordered(self.config.max_in_flight.max(1));

        let mut classified = 0;
        let mut failures = Vec::new();
        while let Some((id, outcome)) = completions.next().await {
            match outcome {
                Ok(result) => match self.store.merge_classification(generation, &id, result) {
                    MergeOutcome::Merged => classified += 1,
                    MergeOutcome::Stale => {
                        tracing::debug!(target: "sync", generation, id = %id, "discarding verdict from superseded cycle");
                    }
                    MergeOutcome::Missing => {
                        tracing::debug!(target: "sync", generation, id = %id, "message removed before its verdict arrived");
                    }
                    MergeOutcome::Duplicate => {
                        tracing::debug!(target: "sync", generation, id = %id, "duplicate verdict ignored");
                    }
                },
                Err(err) => {
                    let reason = format!("{err:#}");
                    tracing::warn!(target: "sync", generation, id = %id, error = %reason, "classification failed; message stays unclassified");
                    failures.push((id, reason));
                }
            }
        }
        (classified, failures)
    }
}

fn dedup_refs(refs: Vec<MessageRef>) -> Vec<MessageRef> {
    let mut seen = HashSet::with_capacity(refs.len());
    refs.into_iter()
        .filter(|message_ref| seen.insert(message_ref.id.clone()))
        .collect()
}
