//! Connects the first modem to an APN and prints the resulting IP setup.

use clap::Parser;
use color_eyre::eyre::{bail, ContextCompat};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    /// Access point name to connect to.
    apn: String,

    /// IP family: 4, 6 or 64 (dual stack).
    #[arg(default_value = "64")]
    ip_type: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let ip_type = match args.ip_type.as_str() {
        "4" => cellular::IpType::V4,
        "6" => cellular::IpType::V6,
        "64" => cellular::IpType::V4V6,
        other => bail!("unknown IP family '{other}', expected 4, 6 or 64"),
    };

    let manager = cellular::ModemManager::connect().await?;
    let modem = manager.any_modem().context("no modem available")?;

    if !modem.registered().await? {
        bail!("modem is {}, register it first", modem.state().await?);
    }

    println!("connecting to '{}' ({ip_type})...", args.apn);
    modem.connect(&args.apn, ip_type).await?;

    let connection = modem
        .active_connection()
        .await?
        .context("no active connection after connect")?;
    println!("connected via {}", connection.interface().await?);

    if let Some(config) = connection.ipv4_config().await? {
        println!(
            "ipv4: {}/{} gw {} dns {} {}",
            config.address, config.prefix, config.gateway, config.dns1, config.dns2,
        );
    }
    if let Some(config) = connection.ipv6_config().await? {
        println!(
            "ipv6: {}/{} gw {} dns {} {}",
            config.address, config.prefix, config.gateway, config.dns1, config.dns2,
        );
    }

    Ok(())
}
