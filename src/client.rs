use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::token::TokenStore;
use crate::types::{Envelope, Home, HomeStatus, HomeStatusData, HomesData};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.netatmo.com";

pub struct CloudClientBuilder {
    base_url: String,
    store: Arc<TokenStore>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl CloudClientBuilder {
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            store,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<CloudClient> {
        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };
        Ok(CloudClient {
            http: reqwest::Client::new(),
            base_url: self.base_url,
            store: self.store,
            logger,
        })
    }
}

/// Authenticated wrapper around the four cloud operations.
///
/// Every call follows the same envelope: a bearer token is required up
/// front, 401/403 clears the stored access token so the next refresh cycle
/// re-acquires, any other non-2xx is transient, and a 2xx body is unwrapped
/// from the standard `{"body": ...}` envelope.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<TokenStore>,
    logger: Option<Mutex<MessageLogger>>,
}

impl CloudClient {
    pub fn builder(store: Arc<TokenStore>) -> CloudClientBuilder {
        CloudClientBuilder::new(store)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// All homes on the account with their rooms and modules, fetched fresh.
    pub async fn list_homes(&self) -> Result<Vec<Home>> {
        let value = self.call("/api/homesdata", &[]).await?;
        let parsed: Envelope<HomesData> = serde_json::from_value(value)
            .map_err(|e| Error::Remote {
                status: 200,
                message: format!("malformed homesdata payload: {e}"),
            })?;
        Ok(parsed.body.homes)
    }

    /// Live room/module status snapshot for one home.
    pub async fn get_home_status(&self, home_id: &str) -> Result<HomeStatus> {
        let value = self
            .call("/api/homestatus", &[("home_id", home_id.to_string())])
            .await?;
        let parsed: Envelope<HomeStatusData> = serde_json::from_value(value)
            .map_err(|e| Error::Remote {
                status: 200,
                message: format!("malformed homestatus payload: {e}"),
            })?;
        Ok(parsed.body.home)
    }

    /// Manual setpoint override for one room.
    pub async fn set_target_temperature(
        &self,
        home_id: &str,
        room_id: &str,
        temp: f64,
    ) -> Result<()> {
        debug!(home = home_id, room = room_id, temp, "setting target temperature");
        self.call(
            "/api/setroomthermpoint",
            &[
                ("home_id", home_id.to_string()),
                ("room_id", room_id.to_string()),
                ("mode", "manual".to_string()),
                ("temp", temp.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Home-wide mode. The gateway-facing `"off"` maps to the provider's
    /// away mode; every other mode falls back to the schedule.
    pub async fn set_mode(&self, home_id: &str, mode: &str) -> Result<()> {
        let provider_mode = if mode == "off" { "away" } else { "schedule" };
        debug!(home = home_id, mode = provider_mode, "setting thermostat mode");
        self.call(
            "/api/setthermmode",
            &[
                ("home_id", home_id.to_string()),
                ("mode", provider_mode.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn call(&self, path: &str, form: &[(&str, String)]) -> Result<Value> {
        let access_token = self.store.snapshot().access_token;
        if access_token.is_empty() {
            return Err(Error::Unauthorized("no access token".to_string()));
        }

        if let Some(logger) = &self.logger {
            logger.lock().unwrap().log_request(path, form);
        }

        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(access_token)
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            warn!(path, %status, "cloud rejected access token, clearing it");
            self.store.clear_access();
            if let Some(logger) = &self.logger {
                logger
                    .lock()
                    .unwrap()
                    .log_response(path, status.as_u16(), &Value::Null);
            }
            return Err(Error::Unauthorized(format!(
                "cloud API returned {status}"
            )));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            if let Some(logger) = &self.logger {
                logger
                    .lock()
                    .unwrap()
                    .log_response(path, status.as_u16(), &Value::Null);
            }
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let value: Value = resp.json().await?;
        if let Some(logger) = &self.logger {
            logger
                .lock()
                .unwrap()
                .log_response(path, status.as_u16(), &value);
        }
        Ok(value)
    }
}
