//! Unlocks the SIM of the first modem with a PIN, or a PUK plus a new PIN.

use clap::Parser;
use color_eyre::eyre::{bail, ContextCompat};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Args {
    /// The PIN to unlock with (or to set, when --puk is given).
    pin: String,

    /// Unlock with this PUK and set the given PIN as the new one.
    #[arg(long)]
    puk: Option<String>,
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

    println!("lock state: {}", modem.lock_state().await?);
    if !modem.locked().await? {
        println!("modem is not locked, nothing to do");
        return Ok(());
    }

    let sim = modem.active_sim().await?.context("no SIM present")?;
    let result = match &args.puk {
        Some(puk) => sim.send_puk(puk, &args.pin).await,
        None => sim.send_pin(&args.pin).await,
    };

    match result {
        Ok(()) => println!("unlocked, lock state now {}", modem.lock_state().await?),
        Err(err @ cellular::Error::WrongCredential)
        | Err(err @ cellular::Error::InvalidCredentialFormat) => {
            bail!("{err} (mind the retry counter!)")
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
