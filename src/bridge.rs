use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{CloudClient, DEFAULT_BASE_URL};
use crate::config::{ConfigStore, KEY_BASE_URL, KEY_CLIENT_ID, KEY_CLIENT_SECRET};
use crate::logger::MessageLogMode;
use crate::oauth::{self, AuthPhase, Authorizer, CallbackParams};
use crate::refresh::RefreshScheduler;
use crate::signal::{battery_to_percent, signal_to_percent};
use crate::token::TokenStore;
use crate::types::{
    Capability, HomeStatus, PropertyValue, ThermostatDevice, SUPPORTED_MODULE_TYPES,
};
use crate::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

type DeviceCallback = Box<dyn Fn(&ThermostatDevice) + Send + Sync>;
type PropertyCallback = Box<dyn Fn(&str, &str, &PropertyValue) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct DeviceKey {
    home_id: String,
    room_id: String,
}

#[derive(Default)]
struct EngineState {
    devices: BTreeMap<DeviceKey, ThermostatDevice>,
    by_device_id: HashMap<String, DeviceKey>,
    module_rooms: HashMap<String, DeviceKey>,
    homes: Vec<String>,
}

pub struct EnergyBridgeBuilder {
    config: Arc<dyn ConfigStore>,
    poll_interval: Duration,
    replace_pending_auth: bool,
    device_callbacks: Vec<DeviceCallback>,
    property_callbacks: Vec<PropertyCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl EnergyBridgeBuilder {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        Self {
            config,
            poll_interval: DEFAULT_POLL_INTERVAL,
            replace_pending_auth: false,
            device_callbacks: Vec::new(),
            property_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Let a new `begin_authorization` silently abandon a pending one
    /// instead of erroring.
    pub fn replace_pending_auth(mut self, allow: bool) -> Self {
        self.replace_pending_auth = allow;
        self
    }

    pub fn on_device_added(mut self, f: impl Fn(&ThermostatDevice) + Send + Sync + 'static) -> Self {
        self.device_callbacks.push(Box::new(f));
        self
    }

    pub fn on_property_changed(
        mut self,
        f: impl Fn(&str, &str, &PropertyValue) + Send + Sync + 'static,
    ) -> Self {
        self.property_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<EnergyBridge> {
        let client_id = required(&*self.config, KEY_CLIENT_ID)?;
        let client_secret = required(&*self.config, KEY_CLIENT_SECRET)?;
        let base_url = self
            .config
            .get(KEY_BASE_URL)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let store = Arc::new(TokenStore::load(self.config.clone()));

        let mut client_builder = CloudClient::builder(store.clone()).base_url(&base_url);
        if let (Some(mode), Some(path)) = (self.log_mode, self.log_path) {
            client_builder = client_builder.message_log(mode, path);
        }
        let client = client_builder.build()?;

        let scheduler = RefreshScheduler::new(
            client.http().clone(),
            &base_url,
            &client_id,
            &client_secret,
            store.clone(),
        );

        Ok(EnergyBridge {
            inner: Arc::new(BridgeInner {
                authorizer: Mutex::new(Authorizer::new(
                    &base_url,
                    &client_id,
                    self.replace_pending_auth,
                )),
                client,
                scheduler,
                store,
                client_id,
                client_secret,
                base_url,
                state: Mutex::new(EngineState::default()),
                device_callbacks: self.device_callbacks,
                property_callbacks: self.property_callbacks,
                poll_interval: self.poll_interval,
                poll_handle: Mutex::new(None),
            }),
        })
    }
}

fn required(config: &dyn ConfigStore, key: &str) -> Result<String> {
    config
        .get(key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Config(format!("missing required key \"{key}\"")))
}

struct BridgeInner {
    authorizer: Mutex<Authorizer>,
    client: CloudClient,
    scheduler: Arc<RefreshScheduler>,
    store: Arc<TokenStore>,
    client_id: String,
    client_secret: String,
    base_url: String,
    state: Mutex<EngineState>,
    device_callbacks: Vec<DeviceCallback>,
    property_callbacks: Vec<PropertyCallback>,
    poll_interval: Duration,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

/// The adapter: owns the auth lifecycle, the poll loop and the local
/// device map, and forwards gateway writes to the cloud.
#[derive(Clone)]
pub struct EnergyBridge {
    inner: Arc<BridgeInner>,
}

impl EnergyBridge {
    pub fn builder(config: Arc<dyn ConfigStore>) -> EnergyBridgeBuilder {
        EnergyBridgeBuilder::new(config)
    }

    pub fn is_authorized(&self) -> bool {
        self.inner.store.is_authorized()
    }

    pub fn auth_phase(&self) -> AuthPhase {
        self.inner.authorizer.lock().unwrap().phase()
    }

    /// Phase 1 of pairing: the returned URL must be shown to the user,
    /// whose browser will eventually hit the redirect with a one-time code.
    pub fn begin_authorization(&self, scopes: &str, redirect_uri: &str) -> Result<String> {
        self.inner
            .authorizer
            .lock()
            .unwrap()
            .begin(scopes, redirect_uri)
    }

    /// Phase 2 of pairing: validate the callback, exchange the code, arm
    /// the refresh schedule, then discover and start polling. A discovery
    /// failure aborts this pairing attempt but leaves the session tokens
    /// in place.
    pub async fn complete_authorization(&self, params: CallbackParams) -> Result<()> {
        let (code, redirect_uri) = self
            .inner
            .authorizer
            .lock()
            .unwrap()
            .accept_callback(&params)?;

        let exchanged = oauth::exchange_code(
            self.inner.client.http(),
            &self.inner.base_url,
            &self.inner.client_id,
            &self.inner.client_secret,
            &code,
            &redirect_uri,
        )
        .await;

        let tokens = match exchanged {
            Ok(tokens) => {
                self.inner.authorizer.lock().unwrap().mark_done();
                tokens
            }
            Err(e) => {
                self.inner.authorizer.lock().unwrap().mark_failed();
                return Err(e);
            }
        };

        let expires_at = tokens.expires_at();
        self.inner
            .store
            .store(tokens.access_token, expires_at, tokens.refresh_token);
        info!("authorization complete");

        self.inner.scheduler.arm();
        self.discover().await?;
        self.start_polling();
        Ok(())
    }

    /// Resume a previously persisted session without user interaction.
    /// Refreshes inline when the stored access token is missing or stale,
    /// so discovery starts with a usable token.
    pub async fn start(&self) -> Result<()> {
        if !self.inner.store.is_authorized() {
            return Err(Error::Unauthorized(
                "no refresh token on hand; pair the bridge first".to_string(),
            ));
        }

        let snapshot = self.inner.store.snapshot();
        let stale = snapshot.access_token.is_empty()
            || snapshot.expires_at.is_none_or(|t| t <= Utc::now());
        if stale {
            self.inner.scheduler.refresh().await?;
        }

        self.inner.scheduler.arm();
        self.discover().await?;
        self.start_polling();
        Ok(())
    }

    /// Map every remote room to a local device and route valve modules to
    /// their owning rooms. Safe to call repeatedly; devices are created
    /// once and never destroyed.
    pub async fn discover(&self) -> Result<()> {
        let homes = self.inner.client.list_homes().await?;

        let added: Vec<ThermostatDevice> = {
            let mut state = self.inner.state.lock().unwrap();
            let mut new_keys = Vec::new();

            for home in &homes {
                if !state.homes.contains(&home.id) {
                    state.homes.push(home.id.clone());
                }
                for room in &home.rooms {
                    let key = DeviceKey {
                        home_id: home.id.clone(),
                        room_id: room.id.clone(),
                    };
                    if !state.devices.contains_key(&key) {
                        let device = ThermostatDevice::new(&home.id, &room.id, &room.name);
                        state.by_device_id.insert(device.id.clone(), key.clone());
                        state.devices.insert(key.clone(), device);
                        new_keys.push(key);
                    }
                }
                for module in &home.modules {
                    if !SUPPORTED_MODULE_TYPES.contains(&module.module_type.as_str()) {
                        continue;
                    }
                    let Some(room_id) = &module.room_id else {
                        continue;
                    };
                    let key = DeviceKey {
                        home_id: home.id.clone(),
                        room_id: room_id.clone(),
                    };
                    let Some(device) = state.devices.get_mut(&key) else {
                        warn!(module = %module.id, room = %room_id, "valve references an unknown room");
                        continue;
                    };
                    device.attach_valve_telemetry();
                    state.module_rooms.insert(module.id.clone(), key);
                }
            }

            new_keys
                .iter()
                .filter_map(|k| state.devices.get(k).cloned())
                .collect()
        };

        for device in &added {
            debug!(device = %device.id, name = %device.name, "device discovered");
            for cb in &self.inner.device_callbacks {
                cb(device);
            }
        }
        Ok(())
    }

    /// One reconciliation cycle over every known home. A failure fetching
    /// one home's status is logged and skipped; the other homes still
    /// update this cycle.
    pub async fn poll_once(&self) {
        let homes: Vec<String> = self.inner.state.lock().unwrap().homes.clone();
        for home_id in homes {
            match self.inner.client.get_home_status(&home_id).await {
                Ok(status) => self.apply_status(&home_id, &status),
                Err(e) => {
                    warn!(home = %home_id, error = %e, "status fetch failed; skipping this cycle");
                }
            }
        }
    }

    fn apply_status(&self, home_id: &str, status: &HomeStatus) {
        let changed: Vec<(String, String, PropertyValue)> = {
            let mut state = self.inner.state.lock().unwrap();
            let mut changed = Vec::new();

            for room in &status.rooms {
                let key = DeviceKey {
                    home_id: home_id.to_string(),
                    room_id: room.id.clone(),
                };
                let Some(device) = state.devices.get_mut(&key) else {
                    continue;
                };
                if let Some(t) = room.therm_measured_temperature {
                    apply_value(device, "temperature", PropertyValue::Number(t), &mut changed);
                }
                if let Some(t) = room.therm_setpoint_temperature {
                    apply_value(
                        device,
                        "targetTemperature",
                        PropertyValue::Number(t),
                        &mut changed,
                    );
                }
                if let Some(power) = room.heating_power_request {
                    apply_value(
                        device,
                        "heating",
                        PropertyValue::Bool(power > 0.0),
                        &mut changed,
                    );
                }
                if let Some(mode) = &room.therm_setpoint_mode {
                    apply_value(device, "mode", PropertyValue::Text(mode.clone()), &mut changed);
                }
            }

            for module in &status.modules {
                if !SUPPORTED_MODULE_TYPES.contains(&module.module_type.as_str()) {
                    continue;
                }
                let Some(key) = state.module_rooms.get(&module.id).cloned() else {
                    continue;
                };
                let Some(device) = state.devices.get_mut(&key) else {
                    continue;
                };
                if let Some(mv) = module.battery_level
                    && let Some(pct) = battery_to_percent(mv, &module.module_type)
                {
                    apply_value(
                        device,
                        "battery",
                        PropertyValue::Number(f64::from(pct)),
                        &mut changed,
                    );
                }
                if let Some(rf) = module.rf_strength {
                    apply_value(
                        device,
                        "signal",
                        PropertyValue::Number(f64::from(signal_to_percent(rf))),
                        &mut changed,
                    );
                }
            }

            changed
        };

        if !changed.is_empty() {
            debug!(home = home_id, count = changed.len(), "applied property changes");
        }
        for (device_id, name, value) in &changed {
            for cb in &self.inner.property_callbacks {
                cb(device_id, name, value);
            }
        }
    }

    /// Start the fixed-interval poll loop, first cycle immediately.
    /// Idempotent: repeated authorization success never stacks timers.
    pub fn start_polling(&self) {
        let mut slot = self.inner.poll_handle.lock().unwrap();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("poll interval already running");
            return;
        }

        let bridge = self.clone();
        let interval = self.inner.poll_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                bridge.poll_once().await;
            }
        }));
    }

    /// Forward a gateway-issued property write to the cloud. Dispatch is
    /// by the cell's capability tag; the local cell is left untouched and
    /// the next poll reconciles the confirmed value.
    pub async fn set_property(
        &self,
        device_id: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let (capability, home_id, room_id) = {
            let state = self.inner.state.lock().unwrap();
            let key = state
                .by_device_id
                .get(device_id)
                .ok_or_else(|| Error::UnknownDevice(device_id.to_string()))?;
            let device = &state.devices[key];
            let cell = device.property(name).ok_or_else(|| Error::InvalidProperty {
                device: device_id.to_string(),
                name: name.to_string(),
                reason: "no such property".to_string(),
            })?;
            (cell.capability, device.home_id.clone(), device.room_id.clone())
        };

        match capability {
            Capability::TargetTemperature => {
                let PropertyValue::Number(temp) = value else {
                    return Err(Error::InvalidProperty {
                        device: device_id.to_string(),
                        name: name.to_string(),
                        reason: "expected a number".to_string(),
                    });
                };
                self.inner
                    .client
                    .set_target_temperature(&home_id, &room_id, temp)
                    .await
            }
            Capability::Mode => {
                let PropertyValue::Text(mode) = value else {
                    return Err(Error::InvalidProperty {
                        device: device_id.to_string(),
                        name: name.to_string(),
                        reason: "expected a mode string".to_string(),
                    });
                };
                self.inner.client.set_mode(&home_id, &mode).await
            }
            Capability::ReadOnly => Err(Error::InvalidProperty {
                device: device_id.to_string(),
                name: name.to_string(),
                reason: "property is read-only".to_string(),
            }),
        }
    }

    pub fn devices(&self) -> Vec<ThermostatDevice> {
        self.inner
            .state
            .lock()
            .unwrap()
            .devices
            .values()
            .cloned()
            .collect()
    }

    pub fn device(&self, device_id: &str) -> Option<ThermostatDevice> {
        let state = self.inner.state.lock().unwrap();
        let key = state.by_device_id.get(device_id)?;
        state.devices.get(key).cloned()
    }

    /// Tear down the refresh and poll tasks.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.poll_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.inner.scheduler.shutdown();
    }
}

fn apply_value(
    device: &mut ThermostatDevice,
    name: &str,
    value: PropertyValue,
    changed: &mut Vec<(String, String, PropertyValue)>,
) {
    let device_id = device.id.clone();
    if let Some(cell) = device.property_mut(name)
        && cell.update(value.clone())
    {
        changed.push((device_id, name.to_string(), value));
    }
}
