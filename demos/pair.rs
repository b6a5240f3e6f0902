use std::io::BufRead;
use std::sync::Arc;

use netatmo_energy::{CallbackParams, ConfigStore, EnergyBridge, FileConfigStore};

const SCOPES: &str = "read_thermostat write_thermostat";
const REDIRECT_URI: &str = "http://localhost:8888/callback";

/// One-shot pairing: prints the authorization URL, then expects the full
/// redirect URL (copied from the browser address bar) on stdin.
#[tokio::main]
async fn main() -> netatmo_energy::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).expect("usage: pair <config.json>");
    let config = Arc::new(FileConfigStore::open(config_path)?);

    let bridge = EnergyBridge::builder(config as Arc<dyn ConfigStore>).build()?;

    let url = bridge.begin_authorization(SCOPES, REDIRECT_URI)?;
    println!("Open this URL, authorize, then paste the redirect URL here:\n\n{url}\n");

    let line = std::io::stdin()
        .lock()
        .lines()
        .next()
        .expect("expected a redirect URL on stdin")?;
    let params = callback_params(line.trim());

    bridge.complete_authorization(params).await?;
    println!("Paired. Devices:");
    for device in bridge.devices() {
        println!("  {} ({})", device.name, device.id);
    }
    bridge.shutdown();
    Ok(())
}

fn callback_params(redirect_url: &str) -> CallbackParams {
    let mut params = CallbackParams::default();
    if let Ok(url) = reqwest::Url::parse(redirect_url) {
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "state" => params.state = Some(value.into_owned()),
                "code" => params.code = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                _ => {}
            }
        }
    }
    params
}
