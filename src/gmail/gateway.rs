//! Provider seam consumed by the sync orchestrator and the action handler.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    auth::{Profile, Session},
    domain::{Message, MessageRef},
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("provider error ({code}): {message}")]
    Provider { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::Unauthorized(_))
    }

    /// Whether repeating the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::RateLimited { .. } | GatewayError::Transport(_) => true,
            GatewayError::Provider { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// The provider's own wording, suitable for showing to the user.
    pub fn provider_message(&self) -> String {
        match self {
            GatewayError::Unauthorized(message)
            | GatewayError::NotFound(message)
            | GatewayError::Provider { message, .. }
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            GatewayError::RateLimited { .. } => "Too many requests, try again shortly".into(),
            GatewayError::Transport(err) => format!("Network error: {err}"),
            GatewayError::Decode(detail) => format!("Unexpected provider response: {detail}"),
            _ => "Unknown error".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Extra search terms appended to the unread query.
    pub query: Option<String>,
    pub max_messages: usize,
}

impl ListFilter {
    pub fn search_query(&self) -> String {
        match self.query.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("is:unread {extra}"),
            _ => "is:unread".to_string(),
        }
    }
}

#[async_trait]
pub trait MailGateway: Send + Sync {
    async fn profile(&self, session: &Session) -> Result<Profile, GatewayError>;

    async fn list_unread(
        &self,
        session: &Session,
        filter: &ListFilter,
    ) -> Result<Vec<MessageRef>, GatewayError>;

    async fn get_message(&self, session: &Session, id: &str) -> Result<Message, GatewayError>;

    async fn mark_read(&self, session: &Session, id: &str) -> Result<(), GatewayError>;

    async fn trash(&self, session: &Session, id: &str) -> Result<(), GatewayError>;
}
