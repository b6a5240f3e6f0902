//! Self-rearming access-token renewal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::oauth;
use crate::token::TokenStore;
use crate::{Error, Result};

/// Renews the access token at (or immediately after) expiry.
///
/// One owned task at a time: `arm` cancels any previous schedule before
/// installing a new one, so repeated auth cycles cannot stack timers. A
/// failed refresh is not retried; it demotes the session to
/// needs-re-authorization and the task stops.
pub(crate) struct RefreshScheduler {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    store: Arc<TokenStore>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        client_id: &str,
        client_secret: &str,
        store: Arc<TokenStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            http,
            base_url: base_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            store,
            handle: Mutex::new(None),
        })
    }

    /// (Re)schedule renewal. Sleeps until expiry when a live access token is
    /// present, otherwise refreshes immediately; after each success the loop
    /// re-reads the store and schedules the next renewal.
    pub fn arm(self: &Arc<Self>) {
        let mut slot = self.handle.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let sched = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                let snapshot = sched.store.snapshot();
                if !snapshot.access_token.is_empty()
                    && let Some(expires_at) = snapshot.expires_at
                {
                    let delay = (expires_at - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if delay > Duration::ZERO {
                        debug!(secs = delay.as_secs(), "access token renewal scheduled");
                        tokio::time::sleep(delay).await;
                    }
                }
                if let Err(e) = sched.refresh().await {
                    warn!(error = %e, "token refresh failed; re-authorization required");
                    break;
                }
            }
        }));
    }

    /// One refresh-token grant against the token endpoint.
    ///
    /// A rejection invalidates both tokens: the provider rotates refresh
    /// tokens on use, so a failed grant means the session is unrecoverable
    /// without user interaction.
    pub async fn refresh(&self) -> Result<()> {
        let refresh_token = self.store.snapshot().refresh_token;
        if refresh_token.is_empty() {
            error!("cannot refresh access token without a refresh token");
            return Err(Error::Unauthorized(
                "no refresh token on hand".to_string(),
            ));
        }

        match oauth::refresh_grant(
            &self.http,
            &self.base_url,
            &self.client_id,
            &self.client_secret,
            &refresh_token,
        )
        .await
        {
            Ok(tokens) => {
                debug!("access token refreshed");
                let expires_at = tokens.expires_at();
                self.store
                    .store(tokens.access_token, expires_at, tokens.refresh_token);
                Ok(())
            }
            Err(Error::Http(e)) => Err(Error::Http(e)),
            Err(e) => {
                self.store.clear_all();
                Err(Error::Unauthorized(format!("refresh grant rejected: {e}")))
            }
        }
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
