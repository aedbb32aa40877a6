use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gmail::GatewayError;

/// Credential handle passed explicitly into every gateway call.
#[derive(Clone)]
pub struct Session {
    access_token: Arc<str>,
}

impl Session {
    pub fn new(access_token: &str) -> Result<Self, AuthError> {
        let token = access_token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        Ok(Self {
            access_token: Arc::from(token),
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub email_address: String,
    pub messages_total: Option<u64>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not signed in")]
    SignedOut,
    #[error("sign-in already in progress")]
    InProgress,
    #[error("already signed in; sign out first")]
    AlreadySignedIn,
    #[error("access token is empty")]
    MissingToken,
    #[error("provider rejected the sign-in: {0}")]
    Rejected(#[source] GatewayError),
    #[error("session expired, sign in again: {0}")]
    Expired(#[source] GatewayError),
}

#[derive(Debug, Clone, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    Authenticating,
    SignedIn { session: Session, profile: Profile },
}

impl AuthState {
    pub fn label(&self) -> &'static str {
        match self {
            AuthState::SignedOut => "signed_out",
            AuthState::Authenticating => "authenticating",
            AuthState::SignedIn { .. } => "signed_in",
        }
    }
}

#[derive(Default)]
struct Inner {
    state: AuthState,
    attempt: u64,
}

/// Owns the authentication state machine:
/// SignedOut -> Authenticating -> SignedIn -> SignedOut.
#[derive(Default)]
pub struct SessionManager {
    inner: RwLock<Inner>,
}

/// Ticket for one sign-in attempt; stale tickets cannot complete.
#[derive(Debug)]
pub struct SignInAttempt {
    id: u64,
    pub session: Session,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AuthState {
        self.inner.read().state.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        match &self.inner.read().state {
            AuthState::SignedIn { profile, .. } => Some(profile.clone()),
            _ => None,
        }
    }

    pub fn current(&self) -> Result<Session, AuthError> {
        match &self.inner.read().state {
            AuthState::SignedIn { session, .. } => Ok(session.clone()),
            _ => Err(AuthError::SignedOut),
        }
    }

    pub fn begin(&self, access_token: &str) -> Result<SignInAttempt, AuthError> {
        let session = Session::new(access_token)?;
        let mut inner = self.inner.write();
        match inner.state {
            AuthState::Authenticating => return Err(AuthError::InProgress),
            AuthState::SignedIn { .. } => return Err(AuthError::AlreadySignedIn),
            AuthState::SignedOut => {}
        }
        inner.attempt += 1;
        inner.state = AuthState::Authenticating;
        Ok(SignInAttempt {
            id: inner.attempt,
            session,
        })
    }

    pub fn complete(&self, attempt: SignInAttempt, profile: Profile) -> bool {
        let mut inner = self.inner.write();
        if inner.attempt != attempt.id || !matches!(inner.state, AuthState::Authenticating) {
            return false;
        }
        inner.state = AuthState::SignedIn {
            session: attempt.session,
            profile,
        };
        true
    }

    pub fn fail(&self, attempt: &SignInAttempt) {
        let mut inner = self.inner.write();
        if inner.attempt == attempt.id && matches!(inner.state, AuthState::Authenticating) {
            inner.state = AuthState::SignedOut;
        }
    }

    /// Returns whether there was anything to sign out of.
    pub fn sign_out(&self) -> bool {
        let mut inner = self.inner.write();
        inner.attempt += 1;
        let was_active = !matches!(inner.state, AuthState::SignedOut);
        inner.state = AuthState::SignedOut;
        was_active
    }

    /// Drops a session the provider no longer accepts.
    pub fn expire(&self, session: &Session) {
        let mut inner = self.inner.write();
        if let AuthState::SignedIn { session: live, .. } = &inner.state {
            if Arc::ptr_eq(&live.access_token, &session.access_token) {
                inner.state = AuthState::SignedOut;
                tracing::warn!(target: "auth", "session expired; re-authentication required");
            }
        }
    }
}
