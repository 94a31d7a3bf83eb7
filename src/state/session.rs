//! Authentication session state and its shared provider.
//!
//! The identity collaborator is the only writer. Every other component holds
//! a cloned [`SessionStore`] handle and reads snapshots or subscribes to
//! changes; there is no process-global session.

use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Opaque bearer credential issued by the portal.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Value for an `Authorization: Bearer` header.
    #[must_use]
    pub fn bearer(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Who is signed in, if anyone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub authenticated: bool,
    pub identity: Option<String>,
    #[serde(skip)]
    pub credential: Option<Credential>,
}

impl SessionState {
    #[must_use]
    pub fn signed_in(identity: impl Into<String>, credential: Credential) -> Self {
        Self {
            authenticated: true,
            identity: Some(identity.into()),
            credential: Some(credential),
        }
    }

    /// Credential usable for privileged actions, only while authenticated.
    #[must_use]
    pub fn active_credential(&self) -> Option<&Credential> {
        if self.authenticated {
            self.credential.as_ref()
        } else {
            None
        }
    }
}

#[derive(Default)]
struct Inner {
    state: RwLock<SessionState>,
    subscribers: Mutex<Vec<Sender<SessionState>>>,
}

/// Shared session provider handed to every consumer that needs auth state.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .authenticated
    }

    /// Replaces the session. Subscribers are notified only on change.
    pub fn replace(&self, next: SessionState) {
        {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if *state == next {
                return;
            }
            *state = next.clone();
        }

        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(next.clone()).is_ok());
    }

    /// Receives every subsequent session change.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<SessionState> {
        let (tx, rx) = mpsc::channel();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_is_signed_out() {
        let store = SessionStore::new();
        assert!(!store.is_authenticated());
        assert!(store.snapshot().active_credential().is_none());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let store = SessionStore::new();
        let rx = store.subscribe();

        store.replace(SessionState::signed_in("a@example.com", Credential::new("tok")));

        let seen = rx.try_recv().unwrap();
        assert!(seen.authenticated);
        assert_eq!(seen.identity.as_deref(), Some("a@example.com"));
    }

    #[test]
    fn test_unchanged_session_does_not_notify() {
        let store = SessionStore::new();
        let rx = store.subscribe();
        store.replace(SessionState::default());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let store = SessionStore::new();
        let reader = store.clone();
        store.replace(SessionState::signed_in("b@example.com", Credential::new("t")));
        assert!(reader.is_authenticated());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = Credential::new("secret-token");
        assert!(!format!("{cred:?}").contains("secret"));
        assert_eq!(cred.bearer(), "secret-token");
    }

    #[test]
    fn test_inactive_credential_not_exposed() {
        let state = SessionState {
            authenticated: false,
            identity: None,
            credential: Some(Credential::new("stale")),
        };
        assert!(state.active_credential().is_none());
    }
}
