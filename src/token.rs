//! Bearer token state, mirrored to the config collaborator.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{ConfigStore, KEY_EXPIRES, KEY_REFRESH_TOKEN, KEY_TOKEN};

/// Current token material. Empty strings mean "absent".
///
/// Invariant: a non-empty `access_token` has `expires_at` set, and the
/// instant was in the future when written. The server remains the authority
/// on validity; staleness is only discovered through 403 responses.
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: String,
}

/// Sole owner of [`TokenState`]. Every mutation is mirrored to the config
/// store; a failed mirror write is logged and swallowed — the in-memory
/// state stays authoritative.
pub struct TokenStore {
    state: Mutex<TokenState>,
    config: Arc<dyn ConfigStore>,
}

impl TokenStore {
    /// Restore persisted token state, if any.
    pub fn load(config: Arc<dyn ConfigStore>) -> Self {
        let state = TokenState {
            access_token: config.get(KEY_TOKEN).unwrap_or_default(),
            expires_at: config
                .get(KEY_EXPIRES)
                .filter(|s| !s.is_empty())
                .and_then(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| warn!(error = %e, "ignoring unparseable token expiry"))
                        .ok()
                }),
            refresh_token: config.get(KEY_REFRESH_TOKEN).unwrap_or_default(),
        };
        if !state.refresh_token.is_empty() {
            debug!("restored persisted token state");
        }
        Self {
            state: Mutex::new(state),
            config,
        }
    }

    pub fn snapshot(&self) -> TokenState {
        self.state.lock().unwrap().clone()
    }

    /// True iff a refresh token is present. A missing access token with a
    /// refresh token on hand is a recoverable state, not an unauthorized one.
    pub fn is_authorized(&self) -> bool {
        !self.state.lock().unwrap().refresh_token.is_empty()
    }

    /// Replace all token material, e.g. after a code exchange or a refresh
    /// (which rotates the refresh token).
    pub fn store(&self, access_token: String, expires_at: DateTime<Utc>, refresh_token: String) {
        let state = {
            let mut guard = self.state.lock().unwrap();
            guard.access_token = access_token;
            guard.expires_at = Some(expires_at);
            guard.refresh_token = refresh_token;
            guard.clone()
        };
        self.persist(&state);
    }

    /// Drop the access token only, keeping the refresh token. Used when the
    /// cloud rejects a bearer token: the next refresh cycle re-acquires.
    pub fn clear_access(&self) {
        let state = {
            let mut guard = self.state.lock().unwrap();
            guard.access_token.clear();
            guard.clone()
        };
        self.persist(&state);
    }

    /// Drop everything. The session is dead; the user must pair again.
    pub fn clear_all(&self) {
        let state = {
            let mut guard = self.state.lock().unwrap();
            *guard = TokenState::default();
            guard.clone()
        };
        self.persist(&state);
    }

    fn persist(&self, state: &TokenState) {
        let expires = state
            .expires_at
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        for (key, value) in [
            (KEY_TOKEN, state.access_token.as_str()),
            (KEY_EXPIRES, expires.as_str()),
            (KEY_REFRESH_TOKEN, state.refresh_token.as_str()),
        ] {
            if let Err(e) = self.config.set(key, value) {
                warn!(key, error = %e, "failed to persist token state");
            }
        }
    }
}
