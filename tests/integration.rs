use std::sync::Arc;

use netatmo_energy::{ConfigStore, EnergyBridge, FileConfigStore};

/// Run with: cargo test --test integration -- --ignored
/// Requires a config file with valid credentials and a persisted refresh
/// token from a previous pairing:
///   NETATMO_CONFIG=~/.config/netatmo-energy.json
#[tokio::test]
#[ignore]
async fn resume_discover_and_poll_live() {
    tracing_subscriber::fmt::init();

    let path = std::env::var("NETATMO_CONFIG").expect("set NETATMO_CONFIG to a config file");
    let config = Arc::new(FileConfigStore::open(path).expect("config file should open"));

    let bridge = EnergyBridge::builder(config as Arc<dyn ConfigStore>)
        .build()
        .expect("config should carry client_id/client_secret");

    bridge.start().await.expect("session resume failed");

    let devices = bridge.devices();
    assert!(!devices.is_empty(), "account should expose at least one room");
    for device in &devices {
        println!("{} ({}):", device.name, device.id);
        for prop in device.properties() {
            println!("  {} = {:?}", prop.name, prop.value());
        }
    }

    bridge.poll_once().await;
    bridge.shutdown();
}
