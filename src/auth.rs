//! Credential holder shared by the REST client and the real-time connection.
//!
//! An [`AuthSession`] is created once per signed-in identity and handed to
//! every client constructor. Token changes are broadcast through a
//! `tokio::sync::watch` channel so the connection manager can tear down and
//! re-establish its socket whenever the identity changes.

use std::fmt;
use tokio::sync::watch;

/// Bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    token: watch::Sender<Option<AuthToken>>,
}

impl AuthSession {
    pub fn new() -> Self {
        let (token, _) = watch::channel(None);
        Self { token }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let session = Self::new();
        session.set_token(token);
        session
    }

    pub fn token(&self) -> Option<AuthToken> {
        self.token.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.borrow().is_some()
    }

    /// Stores a new token. Observers are only notified when the value
    /// actually changes.
    pub fn set_token(&self, token: impl Into<String>) {
        let token = AuthToken::new(token);
        let changed = self.token.send_if_modified(|current| {
            if current.as_ref() == Some(&token) {
                false
            } else {
                *current = Some(token);
                true
            }
        });

        if changed {
            tracing::info!("Auth token updated");
        }
    }

    /// Clears the stored token. Returns `true` only for the call that
    /// actually removed a credential.
    pub fn clear(&self) -> bool {
        let cleared = self.token.send_if_modified(|current| current.take().is_some());
        if cleared {
            tracing::info!("Auth token cleared");
        }
        cleared
    }

    /// Receiver that observes every token change.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthToken>> {
        self.token.subscribe()
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}
