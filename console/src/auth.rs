//! Auth session state.
//!
//! Credentials are granted and revoked only by the daemon: the transport
//! reports `authOk` / `authFail` replies to the handshake, and the bus
//! forwards them here. The token also lives in the local store so the next
//! session can present it in its handshake.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::{LocalStore, StoreError, TOKEN_KEY};

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AuthState {
    /// True only while a non-empty token is held
    pub has_credentials: bool,
    pub token: Option<String>,
    pub display_name: Option<String>,
    pub license_key: Option<String>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.has_credentials && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

pub struct AuthSession {
    state: RwLock<AuthState>,
    store: Arc<LocalStore>,
}

impl AuthSession {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            state: RwLock::new(AuthState::default()),
            store,
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.read().clone()
    }

    /// Token to request-builders: empty unless credentials are held.
    pub fn current_token(&self) -> String {
        let state = self.state.read();
        match (&state.token, state.has_credentials) {
            (Some(token), true) if !token.is_empty() => token.clone(),
            _ => String::new(),
        }
    }

    /// Token to present in the connection handshake.
    ///
    /// Prefers the live session token, then the one persisted by a
    /// previous session.
    pub fn handshake_token(&self) -> String {
        let live = self.current_token();
        if !live.is_empty() {
            return live;
        }
        self.store.get_item(TOKEN_KEY).unwrap_or_default()
    }

    pub fn on_auth_ok(&self, token: &str, name: &str, license_key: &str) -> Result<(), StoreError> {
        if token.is_empty() {
            tracing::warn!("Daemon accepted authentication without a token; treating as rejected");
            return self.revoke();
        }

        {
            let mut state = self.state.write();
            state.has_credentials = true;
            state.token = Some(token.to_string());
            state.display_name = Some(name.to_string());
            state.license_key = Some(license_key.to_string());
        }
        tracing::info!(name = %name, "Authenticated with daemon");
        self.store.set_item(TOKEN_KEY, token)
    }

    pub fn on_auth_fail(&self) -> Result<(), StoreError> {
        tracing::warn!("Daemon rejected authentication");
        self.revoke()
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        tracing::info!("Logging out");
        self.revoke()
    }

    fn revoke(&self) -> Result<(), StoreError> {
        *self.state.write() = AuthState::default();
        self.store.remove_item(TOKEN_KEY)
    }
}
