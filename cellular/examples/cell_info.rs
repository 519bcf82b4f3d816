//! Prints the decoded serving and neighboring cell list of the first modem.

use color_eyre::eyre::ContextCompat;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let manager = cellular::ModemManager::connect().await?;
    let modem = manager.any_modem().context("no modem available")?;

    let cells = modem.cell_info().await?;
    println!("{} cells reported", cells.len());

    for cell in cells {
        let channel = match cell.tech() {
            cellular::Technology::Nr5g => cell.nrarfcn(),
            _ => cell.earfcn(),
        };
        println!(
            "{} serving={} ci={:?} pci={:?} channel={:?}",
            cell.tech(),
            cell.serving(),
            cell.ci().ok(),
            cell.pci().ok(),
            channel.ok(),
        );
        if let Ok(signal) = cell.signal() {
            println!(
                "  signal: rsrp={:?} rsrq={:?} sinr={:?}",
                signal.rsrp().ok(),
                signal.rsrq().ok(),
                signal.sinr().ok(),
            );
        }
        if let Ok(location) = cell.location() {
            println!(
                "  location: mcc={:?} mnc={:?} tac={:?}",
                location.mcc().ok(),
                location.mnc().ok(),
                location.tac().ok(),
            );
        }
    }

    Ok(())
}
