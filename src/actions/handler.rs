//! Mark-read and delete, applied against the provider first and then to the snapshot.

use std::{fmt, sync::Arc};

use thiserror::Error;

use crate::{
    auth::{AuthError, SessionManager},
    gmail::{GatewayError, MailGateway},
    sync::SnapshotStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    MarkRead,
    Delete,
}

impl UserAction {
    fn describe(&self) -> &'static str {
        match self {
            UserAction::MarkRead => "mark email as read",
            UserAction::Delete => "delete email",
        }
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserAction::MarkRead => f.write_str("mark_read"),
            UserAction::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Removed,
    /// The message was not in the snapshot; nothing left to do.
    AlreadyAbsent,
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{action} failed for message {id}: {source}")]
    Gateway {
        action: UserAction,
        id: String,
        #[source]
        source: GatewayError,
    },
}

impl ActionError {
    /// Text meant for the person who clicked the button.
    pub fn user_message(&self) -> String {
        match self {
            ActionError::Auth(AuthError::Expired(_)) | ActionError::Auth(AuthError::SignedOut) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ActionError::Auth(err) => format!("Sign-in problem: {err}"),
            ActionError::Gateway { action, source, .. } => {
                format!("Failed to {}: {}", action.describe(), source.provider_message())
            }
        }
    }
}

pub struct UserActionHandler {
    gateway: Arc<dyn MailGateway>,
    sessions: Arc<SessionManager>,
    store: Arc<SnapshotStore>,
}

impl UserActionHandler {
    pub fn new(
        gateway: Arc<dyn MailGateway>,
        sessions: Arc<SessionManager>,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            gateway,
            sessions,
            store,
        }
    }

    pub async fn mark_read(&self, id: &str) -> Result<ActionOutcome, ActionError> {
        self.apply(UserAction::MarkRead, id).await
    }

    pub async fn delete(&self, id: &str) -> Result<ActionOutcome, ActionError> {
        self.apply(UserAction::Delete, id).await
    }

    async fn apply(&self, action: UserAction, id: &str) -> Result<ActionOutcome, ActionError> {
        if !self.store.current().contains(id) {
            tracing::debug!(target: "actions", %action, id, "message not in snapshot; nothing to do");
            return Ok(ActionOutcome::AlreadyAbsent);
        }

        let session = self.sessions.current()?;
        let result = match action {
            UserAction::MarkRead => self.gateway.mark_read(&session, id).await,
            UserAction::Delete => self.gateway.trash(&session, id).await,
        };

        match result {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::info!(target: "actions", %action, id, "provider no longer has the message; treating as done");
            }
            Err(err) if err.is_unauthorized() => {
                self.sessions.expire(&session);
                return Err(ActionError::Auth(AuthError::Expired(err)));
            }
            Err(source) => {
                tracing::warn!(target: "actions", %action, id, error = %source, "action failed; snapshot unchanged");
                return Err(ActionError::Gateway {
                    action,
                    id: id.to_string(),
                    source,
                });
            }
        }

        self.store.remove(id);
        tracing::info!(target: "actions", %action, id, "message removed from dashboard");
        Ok(ActionOutcome::Removed)
    }
}
