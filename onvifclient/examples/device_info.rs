//! Prints the device information of a camera as JSON.
//!
//! ```text
//! cargo run -p onvifclient --example device_info -- <host> [port] [user] [password]
//! cargo run -p onvifclient --example device_info -- @<profile>
//! ```
//!
//! Options and the WSDL directory come from the ONVIF configuration
//! (`ONVIF_CONFIG`, `./.onvif` or `~/.onvif`).

use anyhow::{Context, Result, bail};
use onvifclient::{ClientOptions, DeviceClient};
use onvifconfig::get_config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = get_config();

    let camera = match args.first().map(String::as_str) {
        None => bail!("usage: device_info <host> [port] [user] [password] | @<profile>"),
        Some(profile) if profile.starts_with('@') => {
            DeviceClient::from_config(&config, &profile[1..])?
        }
        Some(host) => {
            let port = match args.get(1) {
                Some(p) => p.parse().with_context(|| format!("invalid port {p}"))?,
                None => 80,
            };
            let user = args.get(2).map(String::as_str).unwrap_or("");
            let password = args.get(3).map(String::as_str).unwrap_or("");
            DeviceClient::new(
                host,
                port,
                user,
                password,
                config.get_wsdl_dir()?,
                ClientOptions::from_config(&config)?,
            )?
        }
    };

    let info = camera.devicemgmt()?.invoke("GetDeviceInformation", &())?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    for (namespace, xaddr) in camera.xaddrs().iter() {
        tracing::info!(namespace, xaddr, "Advertised service");
    }
    Ok(())
}
