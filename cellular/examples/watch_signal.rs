//! Watches lifecycle, signal quality and cell location of the first modem.

use clap::Parser;
use color_eyre::eyre::ContextCompat;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    /// Signal refresh interval in seconds.
    #[arg(long, default_value_t = 5)]
    interval: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let manager = cellular::ModemManager::connect().await?;
    let modem = manager.any_modem().context("no modem available")?;
    println!("watching {}, ctrl-c to stop", modem.path());

    modem
        .observe_modem_state(|old, new| println!("state: {old} -> {new}"))
        .await?;

    modem
        .observe_signal(
            |signal| {
                println!(
                    "signal ({}): rsrp={:?} rsrq={:?} sinr={:?}",
                    signal.tech(),
                    signal.rsrp().ok(),
                    signal.rsrq().ok(),
                    signal.sinr().ok(),
                );
            },
            args.interval,
        )
        .await?;

    modem
        .observe_location(|location| {
            println!(
                "location ({}): mcc={:?} mnc={:?} ci={:?} tac={:?}",
                location.tech(),
                location.mcc().ok(),
                location.mnc().ok(),
                location.ci().ok(),
                location.tac().ok(),
            );
        })
        .await?;

    tokio::signal::ctrl_c().await?;
    Ok(())
}
