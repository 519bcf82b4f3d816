//! Lists every modem the daemon manages, with identity, state and SIM info.

use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let manager = cellular::ModemManager::connect().await?;
    println!("daemon version: {}", manager.version().await?);

    let modems = manager.available_modems();
    if modems.is_empty() {
        println!("no modems available");
        return Ok(());
    }

    for modem in modems {
        println!("modem {}", modem.path());
        println!("  manufacturer: {}", modem.manufacturer().await?);
        println!("  model:        {}", modem.model().await?);
        println!("  firmware:     {}", modem.firmware_version().await?);
        println!("  imei:         {}", modem.imei().await?);
        println!("  state:        {}", modem.state().await?);
        println!("  power:        {}", modem.power_state().await?);
        println!("  technology:   {}", modem.technology().await?);
        match modem.phone_number().await? {
            Some(number) => println!("  number:       {number}"),
            None => println!("  number:       (not reported)"),
        }

        if let Some(sim) = modem.active_sim().await? {
            println!(
                "  sim:          imsi={} iccid={} plmn={} operator={}",
                sim.imsi().await?,
                sim.iccid().await?,
                sim.home_plmn().await?,
                sim.operator_name().await?,
            );
        } else {
            println!("  sim:          none");
        }

        if modem.enabled().await? {
            println!(
                "  network time: {} (epoch {})",
                modem.network_time().await?,
                modem.network_time_epoch().await?,
            );
        }
    }

    Ok(())
}
