//! Two-phase OAuth2 authorization-code flow.
//!
//! Phase 1 (`begin`) builds the provider authorization URL and parks a
//! pending slot; control returns to the caller, which shows the URL to the
//! user out-of-band. Phase 2 (`accept_callback` + `exchange_code`) consumes
//! the redirect payload, validates the CSRF nonce and exchanges the one-time
//! code for tokens. The wall-clock gap between the phases is unbounded; the
//! bridge simply waits for a callback that may never arrive.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

/// Authorization flow progress. At most one flow exists per bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Idle,
    AwaitingCallback,
    Exchanging,
    Done,
    Failed,
}

/// Redirect query parameters, forwarded by the callback receiver as JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
struct PendingAuth {
    nonce: String,
    redirect_uri: String,
}

/// Successful `/oauth2/token` response, for both grant types.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.expires_in)
    }
}

pub(crate) struct Authorizer {
    base_url: String,
    client_id: String,
    phase: AuthPhase,
    pending: Option<PendingAuth>,
    replace_pending: bool,
}

impl Authorizer {
    pub fn new(base_url: &str, client_id: &str, replace_pending: bool) -> Self {
        Self {
            base_url: base_url.to_string(),
            client_id: client_id.to_string(),
            phase: AuthPhase::Idle,
            pending: None,
            replace_pending,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    /// Build the authorization URL and arm the pending slot.
    ///
    /// A second call while a callback is outstanding abandons the first
    /// flow's nonce, so it is rejected unless `replace_pending` was opted
    /// into at build time.
    pub fn begin(&mut self, scopes: &str, redirect_uri: &str) -> Result<String> {
        if self.pending.is_some() && !self.replace_pending {
            return Err(Error::AuthFlow(
                "an authorization is already awaiting its callback".to_string(),
            ));
        }

        let nonce = Uuid::new_v4().simple().to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/oauth2/authorize", self.base_url),
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", scopes),
                ("state", nonce.as_str()),
            ],
        )
        .map_err(|e| Error::AuthFlow(format!("invalid authorization URL: {e}")))?;

        self.pending = Some(PendingAuth {
            nonce,
            redirect_uri: redirect_uri.to_string(),
        });
        self.phase = AuthPhase::AwaitingCallback;
        debug!("authorization flow started, awaiting callback");
        Ok(url.to_string())
    }

    /// Consume the pending slot against the callback payload.
    ///
    /// Returns the authorization code and the redirect URI it was issued
    /// for. Any validation failure kills the current attempt: the pending
    /// slot is gone either way and the user must pair again.
    pub fn accept_callback(&mut self, params: &CallbackParams) -> Result<(String, String)> {
        let pending = self.pending.take().ok_or_else(|| {
            Error::AuthFlow("no authorization is awaiting a callback".to_string())
        })?;

        let checked = (|| {
            if let Some(denial) = &params.error {
                return Err(Error::AuthFlow(format!("provider denied access: {denial}")));
            }
            if params.state.as_deref() != Some(pending.nonce.as_str()) {
                return Err(Error::AuthFlow(
                    "state mismatch in callback (possible CSRF)".to_string(),
                ));
            }
            params
                .code
                .clone()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| Error::AuthFlow("callback carried no authorization code".to_string()))
        })();

        match checked {
            Ok(code) => {
                self.phase = AuthPhase::Exchanging;
                Ok((code, pending.redirect_uri))
            }
            Err(e) => {
                self.phase = AuthPhase::Failed;
                Err(e)
            }
        }
    }

    pub fn mark_done(&mut self) {
        self.phase = AuthPhase::Done;
    }

    pub fn mark_failed(&mut self) {
        self.phase = AuthPhase::Failed;
    }
}

/// Exchange a one-time authorization code for tokens.
pub(crate) async fn exchange_code(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    token_request(
        http,
        base_url,
        &[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await
}

/// Mint a fresh access token from the long-lived refresh token.
pub(crate) async fn refresh_grant(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    token_request(
        http,
        base_url,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ],
    )
    .await
}

async fn token_request(
    http: &reqwest::Client,
    base_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let resp = http
        .post(format!("{base_url}/oauth2/token"))
        .form(form)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::AuthFlow(format!(
            "token endpoint returned {status}"
        )));
    }
    Ok(resp.json::<TokenResponse>().await?)
}
