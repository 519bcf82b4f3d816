//! Typed async client model for cellular modems managed by
//! [ModemManager](https://modemmanager.org/) over D-Bus.
//!
//! [`ModemManager`] tracks the modems the daemon announces and hands out
//! [`Modem`] session handles; those expose the lifecycle state machine,
//! SIM and connection views, and decoded telemetry ([`Signal`],
//! [`Location`], [`CellInfo`]) instead of the daemon's raw variant maps.
//!
//! Operations that need the modem to be in a minimum lifecycle state check
//! that state client-side first and fail with [`Error::Precondition`],
//! so callers can tell "not ready yet" apart from a daemon failure.
//!
//! # Example
//! ```no_run
//! # tokio_test::block_on(async {
//! let manager = cellular::ModemManager::connect().await.unwrap();
//! if let Some(modem) = manager.any_modem() {
//!     println!("{} ({})", modem.model().await.unwrap(), modem.state().await.unwrap());
//! }
//! # })
//! ```
//!
//! Observer callbacks (state, signal, location, traffic) run on the bus
//! delivery tasks, not on the registering thread; guard any shared state
//! accordingly.

pub mod attrs;
mod connection;
mod error;
mod modem;
mod registry;
mod sim;
pub mod telemetry;

pub use connection::{Connection, IpConfig, IpType, TrafficStats};
pub use error::{Error, Result};
pub use modem::{LockState, Modem, ModemState, PowerState};
pub use registry::{AwaitTarget, ModemManager, ModemWaiter};
pub use sim::Sim;
pub use telemetry::{CellInfo, Location, Signal, Technology};
