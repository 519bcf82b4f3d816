//! Streams RX/TX byte counters of the first modem's active connection.

use clap::Parser;
use color_eyre::eyre::ContextCompat;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    /// Counter refresh interval in milliseconds.
    #[arg(long, default_value_t = 1000)]
    interval_ms: u32,
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
    let connection = modem
        .active_connection()
        .await?
        .context("no active connection, connect first")?;

    let stats = connection.traffic_stats().await?;
    println!(
        "monitoring {} (rx {} / tx {}), ctrl-c to stop",
        connection.interface().await?,
        stats.rx_bytes,
        stats.tx_bytes,
    );

    connection
        .observe_traffic_stats(
            |stats| println!("rx {} / tx {}", stats.rx_bytes, stats.tx_bytes),
            args.interval_ms,
        )
        .await?;

    tokio::signal::ctrl_c().await?;
    Ok(())
}
