//! Session credential source.
//!
//! The identity store itself is external; the sync engine only needs the
//! current bearer token and a way to hear when it changes.

use tokio::sync::watch;
use tracing::info;

pub trait CredentialProvider: Send + Sync {
    /// Receiver that observes every token change. `None` means logged out.
    fn token_updates(&self) -> watch::Receiver<Option<String>>;

    fn current_token(&self) -> Option<String> {
        self.token_updates().borrow().clone()
    }
}

/// In-process session store driven by login / refresh / logout.
pub struct SessionStore {
    tx: watch::Sender<Option<String>>,
}

impl SessionStore {
    pub fn new(initial: Option<String>) -> Self {
        let (tx, _) = watch::channel(initial.filter(|t| !t.is_empty()));
        Self { tx }
    }

    pub fn login(&self, token: impl Into<String>) {
        self.replace(Some(token.into()));
        info!("Session credential issued");
    }

    pub fn refresh(&self, token: impl Into<String>) {
        self.replace(Some(token.into()));
        info!("Session credential refreshed");
    }

    pub fn logout(&self) {
        self.replace(None);
        info!("Session credential cleared");
    }

    fn replace(&self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        self.tx.send_if_modified(|current| {
            if *current == token {
                false
            } else {
                *current = token;
                true
            }
        });
    }
}

impl CredentialProvider for SessionStore {
    fn token_updates(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}
