use std::sync::Arc;
use std::time::Duration;

use netatmo_energy::{ConfigStore, EnergyBridge, FileConfigStore};

#[tokio::main]
async fn main() -> netatmo_energy::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).expect("usage: monitor <config.json>");
    let config = Arc::new(FileConfigStore::open(config_path)?);

    let bridge = EnergyBridge::builder(config as Arc<dyn ConfigStore>)
        .on_device_added(|device| {
            println!("+ {} ({})", device.name, device.id);
        })
        .on_property_changed(|device_id, name, value| {
            println!("[{device_id}] {name} = {value}");
        })
        .build()?;

    println!("Resuming session...");
    bridge.start().await?;
    println!("Polling every 5 minutes. Ctrl-C to stop.");

    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        if !bridge.is_authorized() {
            eprintln!("Session lost; run the pair demo again.");
            bridge.shutdown();
            return Ok(());
        }
    }
}
