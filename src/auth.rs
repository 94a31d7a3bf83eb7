//! Identity collaborator.
//!
//! The portal issues and verifies credentials; this module only relays them.
//! [`SessionManager`] is the single writer of the shared [`SessionStore`]:
//! it refreshes from the portal, performs sign-in, and persists the bearer
//! credential so later invocations can reuse it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants;
use crate::core::transport::{endpoint, HttpTransport};
use crate::error::AuthError;
use crate::state::{Credential, SessionState, SessionStore};

/// Body of `GET /auth/status`.
#[derive(Debug, Deserialize)]
struct AuthStatusResponse {
    authenticated: bool,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl From<AuthStatusResponse> for SessionState {
    fn from(resp: AuthStatusResponse) -> Self {
        Self {
            authenticated: resp.authenticated,
            identity: resp.email,
            credential: resp.token.map(Credential::new),
        }
    }
}

/// JSON answer to a sign-in post, when the portal sends one.
#[derive(Debug, Deserialize)]
struct SignInResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Credential-issuing collaborator.
pub trait IdentityProvider: Send + Sync {
    /// Current session as the portal sees it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Network`] if the portal cannot be reached.
    fn get_session(&self) -> Result<SessionState, AuthError>;

    /// Exchanges an identity-provider token for a portal session.
    ///
    /// # Errors
    ///
    /// [`AuthError::Rejected`] if the portal refuses the credential.
    fn sign_in(&self, id_token: &str) -> Result<SessionState, AuthError>;
}

/// Identity provider backed by the portal's HTTP endpoints.
pub struct PortalIdentity {
    transport: HttpTransport,
    base_url: String,
}

impl PortalIdentity {
    pub fn new(transport: HttpTransport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }
}

impl IdentityProvider for PortalIdentity {
    fn get_session(&self) -> Result<SessionState, AuthError> {
        let url = endpoint(&self.base_url, constants::AUTH_STATUS_PATH);
        let status: AuthStatusResponse = self.transport.client().get(url).send()?.json()?;
        Ok(status.into())
    }

    fn sign_in(&self, id_token: &str) -> Result<SessionState, AuthError> {
        let url = endpoint(&self.base_url, constants::SIGN_IN_PATH);
        let response = self
            .transport
            .client()
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("credential", id_token)])
            .send()?;

        // The portal either answers with JSON or redirects back to its index,
        // carrying any failure in the `error` query parameter.
        if let Some(error) = redirect_error(response.url()) {
            return Err(AuthError::Rejected(error));
        }

        if let Ok(body) = response.json::<SignInResponse>() {
            if let (true, Some(token)) = (body.success, body.token) {
                return Ok(SessionState {
                    authenticated: true,
                    identity: body.email,
                    credential: Some(Credential::new(token)),
                });
            }
            if let Some(error) = body.error {
                return Err(AuthError::Rejected(error));
            }
        }

        let session = self.get_session()?;
        if session.authenticated {
            Ok(session)
        } else {
            Err(AuthError::Rejected("portal did not establish a session".into()))
        }
    }
}

fn redirect_error(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == "error")
        .map(|(_, v)| v.into_owned())
}

/// On-disk form of a signed-in session.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    identity: Option<String>,
    token: String,
}

/// Owns session updates and fans them out through the [`SessionStore`].
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    store: SessionStore,
    session_file: Option<PathBuf>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: SessionStore) -> Self {
        Self {
            provider,
            store,
            session_file: None,
        }
    }

    /// Persists signed-in sessions to `path` and restores from it.
    #[must_use]
    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    /// Handle consumers read from.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Loads a previously persisted credential, if any.
    pub fn restore(&self) -> SessionState {
        let Some(path) = &self.session_file else {
            return self.store.snapshot();
        };
        match load_session(path) {
            Some(session) => {
                debug!("AUTH: restored session from {}", path.display());
                self.store.replace(session);
            }
            None => debug!("AUTH: no stored session at {}", path.display()),
        }
        self.store.snapshot()
    }

    /// Asks the portal for the current session and publishes it.
    ///
    /// A portal that cannot be reached leaves the current session untouched.
    pub fn refresh(&self) -> SessionState {
        match self.provider.get_session() {
            Ok(session) if session.authenticated => {
                self.store.replace(session);
            }
            Ok(_) => {
                // Cookie-less CLI invocations look signed out to the portal;
                // keep a restored bearer credential in that case.
                if self.store.snapshot().active_credential().is_none() {
                    self.store.replace(SessionState::default());
                }
            }
            Err(e) => warn!("AUTH: session check failed: {e}"),
        }
        self.store.snapshot()
    }

    /// Signs in with an identity-provider token and publishes the session.
    ///
    /// # Errors
    ///
    /// Propagates the provider's rejection or transport failure.
    pub fn sign_in(&self, id_token: &str) -> Result<SessionState, AuthError> {
        let session = self.provider.sign_in(id_token)?;
        info!(
            "AUTH: signed in as {}",
            session.identity.as_deref().unwrap_or("unknown")
        );
        if let Some(path) = &self.session_file {
            if let Err(e) = save_session(path, &session) {
                warn!("AUTH: could not persist session to {}: {e}", path.display());
            }
        }
        self.store.replace(session.clone());
        Ok(session)
    }

    /// Forgets the session locally and on disk.
    pub fn sign_out(&self) {
        if let Some(path) = &self.session_file {
            let _ = fs::remove_file(path);
        }
        self.store.replace(SessionState::default());
    }

    /// Receives every subsequent session change.
    #[must_use]
    pub fn on_auth_change(&self) -> Receiver<SessionState> {
        self.store.subscribe()
    }
}

fn load_session(path: &Path) -> Option<SessionState> {
    let content = fs::read_to_string(path).ok()?;
    let stored: StoredSession = serde_json::from_str(&content)
        .map_err(|e| warn!("AUTH: ignoring unreadable {}: {e}", path.display()))
        .ok()?;
    Some(SessionState {
        authenticated: true,
        identity: stored.identity,
        credential: Some(Credential::new(stored.token)),
    })
}

fn save_session(path: &Path, session: &SessionState) -> std::io::Result<()> {
    let Some(credential) = session.active_credential() else {
        return Ok(());
    };
    let stored = StoredSession {
        identity: session.identity.clone(),
        token: credential.bearer().to_string(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(&stored)?)?;

    // Bearer tokens are secrets: owner read/write only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
