//! See <https://modemmanager.org/docs/modemmanager/>
//!
//! To mess around with the `ModemManager1` D-Bus API, you can try the
//! following commands:
//!
//! ```shell
//! $ busctl tree org.freedesktop.ModemManager1
//! $ busctl introspect \
//!     org.freedesktop.ModemManager1 \
//!     /org/freedesktop/ModemManager1/Modem/0 \
//!     org.freedesktop.ModemManager1.Modem
//! $ busctl get-property \
//!     org.freedesktop.ModemManager1 \
//!     /org/freedesktop/ModemManager1/Modem/0 \
//!     org.freedesktop.ModemManager1.Modem State
//! $ busctl call \
//!     org.freedesktop.ModemManager1 \
//!     /org/freedesktop/ModemManager1/Modem/0 \
//!     org.freedesktop.ModemManager1.Modem GetCellInfo
//! ```
//!
//! Modem objects are announced through the standard
//! `org.freedesktop.DBus.ObjectManager` interface on the daemon root object;
//! use `zbus::fdo::ObjectManagerProxy` for that part.

use std::collections::HashMap;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

/// Well-known bus name of the modem management daemon.
pub const MM_BUS_NAME: &str = "org.freedesktop.ModemManager1";
/// Root object of the daemon; also hosts the ObjectManager interface.
pub const MM_PATH: &str = "/org/freedesktop/ModemManager1";
/// All modem objects live below this prefix.
pub const MM_MODEM_PATH_PREFIX: &str = "/org/freedesktop/ModemManager1/Modem/";

/// Well-known bus name of NetworkManager.
pub const NM_BUS_NAME: &str = "org.freedesktop.NetworkManager";
/// Interface carrying the per-device RX/TX byte counters.
pub const NM_STATISTICS_INTERFACE: &str =
    "org.freedesktop.NetworkManager.Device.Statistics";

/// Error name returned by SIM unlock calls when the PIN/PUK is wrong.
pub const MM_ERROR_INCORRECT_PASSWORD: &str =
    "org.freedesktop.ModemManager1.Error.MobileEquipment.IncorrectPassword";
/// Error name returned by SIM unlock calls when the PIN/PUK is malformed.
pub const MM_ERROR_INCORRECT_PARAMETERS: &str =
    "org.freedesktop.ModemManager1.Error.MobileEquipment.IncorrectParameters";

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1",
    default_service = "org.freedesktop.ModemManager1",
    default_path = "/org/freedesktop/ModemManager1",
    gen_blocking = false
)]
pub trait ModemManager1 {
    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1.Modem",
    default_service = "org.freedesktop.ModemManager1",
    gen_blocking = false
)]
pub trait Modem {
    fn enable(&self, enable: bool) -> zbus::Result<()>;

    fn reset(&self) -> zbus::Result<()>;

    /// `state` is a raw `MMModemPowerState` value.
    fn set_power_state(&self, state: u32) -> zbus::Result<()>;

    /// Known keys include `apn` (string) and `ip-type` (`MMBearerIpFamily`).
    fn create_bearer(
        &self,
        properties: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<OwnedObjectPath>;

    /// One map per serving or neighboring cell; keys depend on `cell-type`.
    fn get_cell_info(&self) -> zbus::Result<Vec<HashMap<String, OwnedValue>>>;

    /// Raw `(old, new, reason)` lifecycle transition, `MMModemState` valued.
    #[zbus(signal)]
    fn state_changed(
        &self,
        old: i32,
        new_state: i32,
        reason: u32,
    ) -> zbus::Result<()>;

    #[zbus(property)]
    fn manufacturer(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn model(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn revision(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn own_numbers(&self) -> zbus::Result<Vec<String>>;

    #[zbus(property, name = "State")]
    fn modem_state(&self) -> zbus::Result<i32>;

    #[zbus(property)]
    fn power_state(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn unlock_required(&self) -> zbus::Result<u32>;

    /// Bitmask of `MMModemAccessTechnology` values.
    #[zbus(property)]
    fn access_technologies(&self) -> zbus::Result<u32>;

    /// Path of the active SIM object, `/` when no SIM is present.
    #[zbus(property)]
    fn sim(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn bearers(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1.Modem.Modem3gpp",
    default_service = "org.freedesktop.ModemManager1",
    gen_blocking = false
)]
pub trait Modem3gpp {
    #[zbus(property)]
    fn imei(&self) -> zbus::Result<String>;

    /// The PLMN (MCC + MNC) of the registered network.
    #[zbus(property)]
    fn operator_code(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn operator_name(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1.Modem.Signal",
    default_service = "org.freedesktop.ModemManager1",
    gen_blocking = false
)]
pub trait ModemSignal {
    /// Enables periodic refresh of the signal properties, every `rate`
    /// seconds. A rate of 0 disables polling.
    fn setup(&self, rate: u32) -> zbus::Result<()>;

    #[zbus(property)]
    fn rate(&self) -> zbus::Result<u32>;

    /// LTE metrics: `rsrp`, `rsrq`, `rssi`, `snr`, all doubles.
    #[zbus(property)]
    fn lte(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    /// 5G NR metrics: `rsrp`, `rsrq`, `snr`, all doubles.
    #[zbus(property)]
    fn nr5g(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1.Modem.Location",
    default_service = "org.freedesktop.ModemManager1",
    gen_blocking = false
)]
pub trait ModemLocation {
    /// `sources` is a bitmask of `MMModemLocationSource`; `signal_location`
    /// additionally makes the daemon emit `Location` property updates.
    fn setup(&self, sources: u32, signal_location: bool) -> zbus::Result<()>;

    /// Snapshot of all gathered location data, keyed by source.
    fn get_location(&self) -> zbus::Result<HashMap<u32, OwnedValue>>;

    #[zbus(property)]
    fn location(&self) -> zbus::Result<HashMap<u32, OwnedValue>>;
}

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1.Modem.Time",
    default_service = "org.freedesktop.ModemManager1",
    gen_blocking = false
)]
pub trait ModemTime {
    /// ISO-8601 formatted time reported by the network.
    fn get_network_time(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1.Sim",
    default_service = "org.freedesktop.ModemManager1",
    gen_blocking = false
)]
pub trait Sim {
    fn send_pin(&self, pin: &str) -> zbus::Result<()>;

    fn send_puk(&self, puk: &str, pin: &str) -> zbus::Result<()>;

    #[zbus(property)]
    fn active(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn imsi(&self) -> zbus::Result<String>;

    /// The ICCID of the card.
    #[zbus(property)]
    fn sim_identifier(&self) -> zbus::Result<String>;

    /// The home PLMN (MCC + MNC) stored on the card.
    #[zbus(property)]
    fn operator_identifier(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn operator_name(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.ModemManager1.Bearer",
    default_service = "org.freedesktop.ModemManager1",
    gen_blocking = false
)]
pub trait Bearer {
    fn connect(&self) -> zbus::Result<()>;

    fn disconnect(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn connected(&self) -> zbus::Result<bool>;

    /// Kernel network interface backing this bearer, e.g. `wwan0`.
    #[zbus(property)]
    fn interface(&self) -> zbus::Result<String>;

    /// The settings the bearer was created with (`apn`, `ip-type`, ...).
    #[zbus(property)]
    fn properties(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    /// Keys `address`, `prefix`, `gateway`, `dns1`, `dns2`; only populated
    /// while the bearer is connected.
    #[zbus(property)]
    fn ip4_config(&self) -> zbus::Result<HashMap<String, OwnedValue>>;

    #[zbus(property)]
    fn ip6_config(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager",
    gen_blocking = false
)]
pub trait NetworkManager {
    /// Resolves the NetworkManager device object for a kernel interface name.
    fn get_device_by_ip_iface(&self, iface: &str) -> zbus::Result<OwnedObjectPath>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Device.Statistics",
    default_service = "org.freedesktop.NetworkManager",
    gen_blocking = false
)]
pub trait DeviceStatistics {
    /// How often the counters below are refreshed, in milliseconds.
    /// 0 means they are not refreshed at all.
    #[zbus(property)]
    fn refresh_rate_ms(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn set_refresh_rate_ms(&self, value: u32) -> zbus::Result<()>;

    #[zbus(property)]
    fn rx_bytes(&self) -> zbus::Result<u64>;

    #[zbus(property)]
    fn tx_bytes(&self) -> zbus::Result<u64>;
}
