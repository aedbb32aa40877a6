//! In-memory gateway and classifier used by the orchestrator and action tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    actions::UserActionHandler,
    ai::SpamClassifier,
    auth::{Profile, Session, SessionManager},
    config::SyncConfig,
    domain::{ClassificationResult, Message, MessageRef},
    gmail::{GatewayError, ListFilter, MailGateway},
    sync::{SnapshotStore, SyncOrchestrator},
};

pub fn message(id: &str) -> Message {
    Message {
        id: id.to_string(),
        from: format!("{id}@example.com"),
        subject: format!("subject {id}"),
        snippet: snippet_of(id),
        received_at: None,
        raw: serde_json::json!({ "id": id }),
    }
}

pub fn snippet_of(id: &str) -> String {
    format!("body of {id}")
}

pub fn verdict(is_spam: bool, spam_score: f64) -> ClassificationResult {
    ClassificationResult {
        is_spam,
        spam_score,
        description: if is_spam {
            "This email looks like a promotional offer.".into()
        } else {
            "This email seems legitimate.".into()
        },
        summary: String::new(),
        spam_type: None,
    }
}

pub fn status_error(code: u16, message: &str) -> GatewayError {
    match code {
        401 => GatewayError::Unauthorized(message.into()),
        404 => GatewayError::NotFound(message.into()),
        code => GatewayError::Provider {
            code,
            message: message.into(),
        },
    }
}

#[derive(Default)]
pub struct FakeGateway {
    mailbox: Mutex<Vec<Message>>,
    list_error: Mutex<Option<(u16, String)>>,
    fetch_errors: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
    action_errors: Mutex<HashMap<String, (u16, String)>>,
    held_fetches: Mutex<HashMap<String, (Arc<Notify>, Arc<Notify>)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn with_messages(ids: &[&str]) -> Arc<Self> {
        let gateway = Self::default();
        *gateway.mailbox.lock() = ids.iter().map(|id| message(id)).collect();
        Arc::new(gateway)
    }

    pub fn fail_listing(&self, code: u16, message: &str) {
        *self.list_error.lock() = Some((code, message.into()));
    }

    pub fn restore_listing(&self) {
        *self.list_error.lock() = None;
    }

    /// Fails the next `times` fetches of `id`.
    pub fn fail_fetch(&self, id: &str, code: u16, times: usize) {
        let mut errors = self.fetch_errors.lock();
        let queue = errors.entry(id.to_string()).or_default();
        for _ in 0..times {
            queue.push_back((code, format!("cannot fetch {id}")));
        }
    }

    /// Holds the next fetch of `id`: signals `started`, then waits for `release`.
    pub fn hold_fetch(&self, id: &str, started: Arc<Notify>, release: Arc<Notify>) {
        self.held_fetches
            .lock()
            .insert(id.to_string(), (started, release));
    }

    pub fn fail_action(&self, id: &str, code: u16, message: &str) {
        self.action_errors
            .lock()
            .insert(id.to_string(), (code, message.into()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_matching(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn apply_action(&self, name: &str, id: &str) -> Result<(), GatewayError> {
        self.record(format!("{name}:{id}"));
        if let Some((code, message)) = self.action_errors.lock().get(id) {
            return Err(status_error(*code, message));
        }
        let mut mailbox = self.mailbox.lock();
        let before = mailbox.len();
        mailbox.retain(|message| message.id != id);
        if mailbox.len() == before {
            return Err(status_error(404, "Requested entity was not found."));
        }
        Ok(())
    }
}

#[async_trait]
impl MailGateway for FakeGateway {
    async fn profile(&self, session: &Session) -> Result<Profile, GatewayError> {
        self.record("profile".into());
        if session.access_token() == "revoked" {
            return Err(status_error(401, "Invalid Credentials"));
        }
        Ok(Profile {
            email_address: "me@example.com".into(),
            messages_total: Some(self.mailbox.lock().len() as u64),
        })
    }

    async fn list_unread(
        &self,
        _session: &Session,
        filter: &ListFilter,
    ) -> Result<Vec<MessageRef>, GatewayError> {
        self.record("list".into());
        if let Some((code, message)) = self.list_error.lock().clone() {
            return Err(status_error(code, &message));
        }
        Ok(self
            .mailbox
            .lock()
            .iter()
            .take(filter.max_messages.max(1))
            .map(|message| MessageRef::new(message.id.clone()))
            .collect())
    }

    async fn get_message(&self, _session: &Session, id: &str) -> Result<Message, GatewayError> {
        self.record(format!("get:{id}"));
        tokio::task::yield_now().await;
        let hold = self.held_fetches.lock().remove(id);
        if let Some((started, release)) = hold {
            started.notify_one();
            release.notified().await;
        }
        if let Some((code, message)) = self
            .fetch_errors
            .lock()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
        {
            return Err(status_error(code, &message));
        }
        self.mailbox
            .lock()
            .iter()
            .find(|message| message.id == id)
            .cloned()
            .ok_or_else(|| status_error(404, "Requested entity was not found."))
    }

    async fn mark_read(&self, _session: &Session, id: &str) -> Result<(), GatewayError> {
        self.apply_action("mark_read", id)
    }

    async fn trash(&self, _session: &Session, id: &str) -> Result<(), GatewayError> {
        self.apply_action("trash", id)
    }
}

#[derive(Clone)]
pub enum Step {
    Verdict(ClassificationResult),
    Fail(String),
    /// Signals `started`, then waits for `release` before answering.
    Held {
        started: Arc<Notify>,
        release: Arc<Notify>,
        result: ClassificationResult,
    },
}

/// Scripted classifier keyed by message id (derived from the snippet text).
/// The last step of a script repeats for any further calls.
#[derive(Default)]
pub struct FakeClassifier {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
}

impl FakeClassifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, id: &str, steps: Vec<Step>) {
        self.scripts.lock().insert(snippet_of(id), steps.into());
    }

    pub fn answer(&self, id: &str, is_spam: bool, score: f64) {
        self.script(id, vec![Step::Verdict(verdict(is_spam, score))]);
    }

    pub fn fail(&self, id: &str) {
        self.script(id, vec![Step::Fail("classifier returned 500".into())]);
    }

    fn next_step(&self, text: &str) -> Option<Step> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(text)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl SpamClassifier for FakeClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        tokio::task::yield_now().await;
        match self.next_step(text) {
            Some(Step::Verdict(result)) => Ok(result),
            Some(Step::Fail(reason)) => Err(anyhow!(reason)),
            Some(Step::Held {
                started,
                release,
                result,
            }) => {
                started.notify_one();
                release.notified().await;
                Ok(result)
            }
            None => Ok(verdict(false, 0.0)),
        }
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub classifier: Arc<FakeClassifier>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub actions: Arc<UserActionHandler>,
    pub sessions: Arc<SessionManager>,
}

impl Harness {
    pub fn new(gateway: Arc<FakeGateway>, classifier: Arc<FakeClassifier>) -> Self {
        let sessions = Arc::new(SessionManager::new());
        let store = Arc::new(SnapshotStore::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(
            gateway.clone(),
            classifier.clone(),
            sessions.clone(),
            store.clone(),
            ListFilter {
                query: None,
                max_messages: 100,
            },
            SyncConfig {
                max_in_flight: 4,
                fetch_retries: 2,
            },
        ));
        let actions = Arc::new(UserActionHandler::new(gateway.clone(), sessions.clone(), store));
        Self {
            gateway,
            classifier,
            orchestrator,
            actions,
            sessions,
        }
    }

    pub async fn signed_in(gateway: Arc<FakeGateway>, classifier: Arc<FakeClassifier>) -> Self {
        let harness = Self::new(gateway, classifier);
        harness
            .orchestrator
            .sign_in("token")
            .await
            .expect("fake gateway accepts the token");
        harness
    }
}
