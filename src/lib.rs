mod bridge;
mod client;
mod config;
mod error;
mod logger;
mod oauth;
mod refresh;
mod signal;
mod token;
mod types;

pub use bridge::{EnergyBridge, EnergyBridgeBuilder, DEFAULT_POLL_INTERVAL};
pub use client::{CloudClient, CloudClientBuilder, DEFAULT_BASE_URL};
pub use config::{
    ConfigStore, FileConfigStore, MemoryConfigStore, KEY_BASE_URL, KEY_CLIENT_ID,
    KEY_CLIENT_SECRET, KEY_EXPIRES, KEY_REFRESH_TOKEN, KEY_TOKEN,
};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use oauth::{AuthPhase, CallbackParams};
pub use signal::{battery_to_percent, signal_to_percent};
pub use token::{TokenState, TokenStore};
pub use types::*;
