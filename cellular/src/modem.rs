use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use cellular_dbus as mm;
use chrono::NaiveDateTime;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::connection::{Connection, IpType};
use crate::error::{Error, Result};
use crate::sim::Sim;
use crate::telemetry::{v_str, CellInfo, Location, Signal, Technology};

// MM_MODEM_LOCATION_SOURCE_3GPP_LAC_CI
const LOCATION_SOURCE_LAC_CI: u32 = 1 << 0;

// Refresh rate configured on the daemon when signal polling is off entirely.
const DEFAULT_SIGNAL_RATE_SECS: u32 = 5;

/// General state of a modem.
///
/// The declaration order mirrors the daemon's state machine and is
/// semantically meaningful: derived checks compare with `>=`, e.g. a modem
/// counts as registered in any state from [`ModemState::Registered`] up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModemState {
    /// The modem failed to initialize.
    Failed,
    Unknown,
    /// Starting up.
    Initializing,
    /// Locked; check [`Modem::lock_state`] for the reason.
    Locked,
    /// Disabled (radio off). Power changes are only accepted here.
    Disabled,
    Disabling,
    Enabling,
    /// Enabled but not registered with a network yet.
    Enabled,
    /// Searching for a network to register with.
    Searching,
    /// Registered with a network.
    Registered,
    Disconnecting,
    Connecting,
    /// A call or packet service is active.
    Connected,
}

impl ModemState {
    /// Maps a raw `MMModemState` value; out-of-range input counts as
    /// [`ModemState::Unknown`].
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => Self::Failed,
            1 => Self::Initializing,
            2 => Self::Locked,
            3 => Self::Disabled,
            4 => Self::Disabling,
            5 => Self::Enabling,
            6 => Self::Enabled,
            7 => Self::Searching,
            8 => Self::Registered,
            9 => Self::Disconnecting,
            10 => Self::Connecting,
            11 => Self::Connected,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ModemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
            Self::Initializing => "INITIALIZING",
            Self::Locked => "LOCKED",
            Self::Disabled => "DISABLED",
            Self::Disabling => "DISABLING",
            Self::Enabling => "ENABLING",
            Self::Enabled => "ENABLED",
            Self::Searching => "SEARCHING",
            Self::Registered => "REGISTERED",
            Self::Disconnecting => "DISCONNECTING",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}

/// Power state of a modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PowerState {
    Unknown = 0,
    Off = 1,
    /// Standby, radio off.
    Low = 2,
    On = 3,
}

impl PowerState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Off,
            2 => Self::Low,
            3 => Self::On,
            _ => Self::Unknown,
        }
    }

    fn raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "OFF",
            Self::Low => "LOW",
            Self::On => "ON",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Why a modem sits in [`ModemState::Locked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    /// The modem might not be ready yet.
    Unknown,
    Unlocked,
    PinRequired,
    /// The modem is usable, but PIN2 gates certain features.
    Pin2Required,
    PukRequired,
    Puk2Required,
}

impl LockState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Unlocked,
            2 => Self::PinRequired,
            3 => Self::Pin2Required,
            4 => Self::PukRequired,
            5 => Self::Puk2Required,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Unlocked => "UNLOCKED",
            Self::PinRequired => "SIM_PIN",
            Self::Pin2Required => "SIM_PIN2",
            Self::PukRequired => "SIM_PUK",
            Self::Puk2Required => "SIM_PUK2",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
struct Observers {
    state: Mutex<Option<JoinHandle<()>>>,
    signal: Mutex<Option<JoinHandle<()>>>,
    location: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Observers {
    fn drop(&mut self) {
        for slot in [&self.state, &self.signal, &self.location] {
            if let Ok(mut slot) = slot.lock() {
                if let Some(task) = slot.take() {
                    task.abort();
                }
            }
        }
    }
}

/// Client-side handle to one modem object exported by the management daemon.
///
/// Obtain instances through [`crate::ModemManager`]. Handles are cheap to
/// clone; clones refer to the same remote object and share the observer
/// slots.
#[derive(Clone)]
pub struct Modem {
    conn: zbus::Connection,
    path: OwnedObjectPath,
    observers: Arc<Observers>,
}

impl Modem {
    pub(crate) fn new(conn: zbus::Connection, path: OwnedObjectPath) -> Self {
        Self {
            conn,
            path,
            observers: Arc::new(Observers::default()),
        }
    }

    /// The D-Bus object path identifying this modem.
    pub fn path(&self) -> &OwnedObjectPath {
        &self.path
    }

    async fn modem_proxy(&self) -> Result<mm::ModemProxy<'static>> {
        Ok(mm::ModemProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    async fn modem3gpp_proxy(&self) -> Result<mm::Modem3gppProxy<'static>> {
        Ok(mm::Modem3gppProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    async fn signal_proxy(&self) -> Result<mm::ModemSignalProxy<'static>> {
        Ok(mm::ModemSignalProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    async fn location_proxy(&self) -> Result<mm::ModemLocationProxy<'static>> {
        Ok(mm::ModemLocationProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    async fn time_proxy(&self) -> Result<mm::ModemTimeProxy<'static>> {
        Ok(mm::ModemTimeProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    /// Fails with [`Error::Precondition`] unless the modem has reached
    /// `required`. Purely client-side; the daemon is not consulted beyond
    /// the state read.
    async fn require_state(
        &self,
        required: ModemState,
        action: &'static str,
    ) -> Result<()> {
        let actual = self.state().await?;
        if actual < required {
            return Err(Error::Precondition {
                action,
                required,
                actual,
            });
        }
        Ok(())
    }

    fn replace_observer(
        &self,
        slot: &Mutex<Option<JoinHandle<()>>>,
        task: JoinHandle<()>,
    ) {
        let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    // ---- properties ----

    /// The manufacturer name of the modem.
    pub async fn manufacturer(&self) -> Result<String> {
        Ok(self.modem_proxy().await?.manufacturer().await?)
    }

    /// The model name of the modem.
    pub async fn model(&self) -> Result<String> {
        Ok(self.modem_proxy().await?.model().await?)
    }

    /// The IMEI of the modem.
    pub async fn imei(&self) -> Result<String> {
        Ok(self.modem3gpp_proxy().await?.imei().await?)
    }

    /// The firmware version of the modem.
    pub async fn firmware_version(&self) -> Result<String> {
        Ok(self.modem_proxy().await?.revision().await?)
    }

    /// The phone number (MSISDN), if the daemon reports one.
    /// Likely requires the modem to be unlocked.
    pub async fn phone_number(&self) -> Result<Option<String>> {
        let mut numbers = self.modem_proxy().await?.own_numbers().await?;
        if numbers.is_empty() {
            Ok(None)
        } else {
            Ok(Some(numbers.remove(0)))
        }
    }

    /// The PLMN (MCC + MNC) of the network the modem is registered with.
    pub async fn operator_plmn(&self) -> Result<String> {
        Ok(self.modem3gpp_proxy().await?.operator_code().await?)
    }

    /// The name of the network operator.
    pub async fn operator_name(&self) -> Result<String> {
        Ok(self.modem3gpp_proxy().await?.operator_name().await?)
    }

    // ---- power ----

    /// The current [`PowerState`].
    pub async fn power_state(&self) -> Result<PowerState> {
        Ok(PowerState::from_raw(
            self.modem_proxy().await?.power_state().await?,
        ))
    }

    // the daemon only accepts power changes for disabled modems
    async fn set_power_state(&self, state: PowerState) -> Result<()> {
        self.require_state(ModemState::Disabled, "change power state")
            .await?;
        Ok(self.modem_proxy().await?.set_power_state(state.raw()).await?)
    }

    /// Turns the modem off. Not supported by all hardware.
    pub async fn power_off(&self) -> Result<()> {
        self.set_power_state(PowerState::Off).await
    }

    /// Puts the modem into a low power state (standby, radio off).
    pub async fn power_low(&self) -> Result<()> {
        self.set_power_state(PowerState::Low).await
    }

    /// Puts the modem into the full-on power state.
    pub async fn power_on(&self) -> Result<()> {
        self.set_power_state(PowerState::On).await
    }

    // ---- lifecycle state ----

    /// The current [`ModemState`].
    pub async fn state(&self) -> Result<ModemState> {
        Ok(ModemState::from_raw(
            self.modem_proxy().await?.modem_state().await?,
        ))
    }

    /// Whether the modem is enabled.
    pub async fn enabled(&self) -> Result<bool> {
        Ok(self.state().await? >= ModemState::Enabled)
    }

    /// Whether the modem is registered with a network.
    pub async fn registered(&self) -> Result<bool> {
        Ok(self.state().await? >= ModemState::Registered)
    }

    /// Whether the modem has an active call or packet service.
    pub async fn connected(&self) -> Result<bool> {
        Ok(self.state().await? == ModemState::Connected)
    }

    /// Whether the modem is locked. A lock that only gates PIN2 features
    /// does not count.
    pub async fn locked(&self) -> Result<bool> {
        let state = self.lock_state().await?;
        Ok(!matches!(state, LockState::Unlocked | LockState::Pin2Required))
    }

    /// Enables or disables the modem. The daemon is authoritative for the
    /// resulting state transitions.
    pub async fn enable(&self, enable: bool) -> Result<()> {
        Ok(self.modem_proxy().await?.enable(enable).await?)
    }

    /// Power-cycles the modem.
    ///
    /// This renders the handle, and any [`Sim`]/[`Connection`] obtained
    /// from it, invalid; use [`crate::ModemManager::reset_modem`] to get
    /// the replacement handle after the restart.
    pub async fn reset(&self) -> Result<()> {
        Ok(self.modem_proxy().await?.reset().await?)
    }

    /// Registers `observer` for lifecycle transitions, called with the old
    /// and new state.
    ///
    /// The callback runs on the bus delivery task, not on the registering
    /// thread. Registering again replaces the previous observer; deliveries
    /// still queued for it are dropped, a callback already executing
    /// finishes.
    pub async fn observe_modem_state(
        &self,
        observer: impl Fn(ModemState, ModemState) + Send + Sync + 'static,
    ) -> Result<()> {
        let proxy = self.modem_proxy().await?;
        let task = tokio::spawn(async move {
            let mut transitions = match proxy.receive_state_changed().await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!(%err, "failed to subscribe to modem state changes");
                    return;
                }
            };
            while let Some(transition) = transitions.next().await {
                match transition.args() {
                    Ok(args) => observer(
                        ModemState::from_raw(args.old),
                        ModemState::from_raw(args.new_state),
                    ),
                    Err(err) => {
                        warn!(%err, "dropping malformed state change notification");
                    }
                }
            }
            debug!("modem state notification stream ended");
        });
        self.replace_observer(&self.observers.state, task);
        Ok(())
    }

    // ---- SIM ----

    /// The current [`LockState`], i.e. the reason for
    /// [`ModemState::Locked`].
    pub async fn lock_state(&self) -> Result<LockState> {
        Ok(LockState::from_raw(
            self.modem_proxy().await?.unlock_required().await?,
        ))
    }

    /// The currently active SIM card, if one is present.
    pub async fn active_sim(&self) -> Result<Option<Sim>> {
        let path = self.modem_proxy().await?.sim().await?;
        if path.as_str() == "/" {
            return Ok(None);
        }
        Ok(Some(Sim::new(self.conn.clone(), path)))
    }

    // ---- connections ----

    /// All bearers configured on this modem, active or not.
    pub async fn connections(&self) -> Result<Vec<Connection>> {
        let paths = self.modem_proxy().await?.bearers().await?;
        Ok(paths
            .into_iter()
            .map(|path| Connection::new(self.conn.clone(), path))
            .collect())
    }

    /// The first bearer with an active data path, if any.
    pub async fn active_connection(&self) -> Result<Option<Connection>> {
        for connection in self.connections().await? {
            if connection.active().await? {
                return Ok(Some(connection));
            }
        }
        Ok(None)
    }

    /// Creates a bearer for `apn` and activates it.
    ///
    /// These are two separate daemon calls with no compensating action: if
    /// activation fails, the bearer created by the first step is left
    /// behind unconnected.
    pub async fn connect(&self, apn: &str, ip_type: IpType) -> Result<()> {
        let properties: HashMap<&str, Value<'_>> = HashMap::from([
            ("apn", Value::from(apn)),
            ("ip-type", Value::from(ip_type.raw())),
        ]);

        let bearer_path = self
            .modem_proxy()
            .await?
            .create_bearer(properties)
            .await?;
        debug!(path = %bearer_path, "created bearer");

        let bearer = mm::BearerProxy::builder(&self.conn)
            .path(bearer_path)?
            .build()
            .await?;
        Ok(bearer.connect().await?)
    }

    // ---- telemetry ----

    /// The radio technology currently in use.
    pub async fn technology(&self) -> Result<Technology> {
        let code = self.modem_proxy().await?.access_technologies().await?;
        Ok(Technology::from_access_technology(code))
    }

    /// The current signal quality.
    ///
    /// Requires [`ModemState::Registered`]. If the daemon is not refreshing
    /// signal values yet, a refresh rate of 5 seconds is configured first.
    pub async fn signal(&self) -> Result<Signal> {
        self.require_state(ModemState::Registered, "access signal quality")
            .await?;

        let proxy = self.signal_proxy().await?;
        if proxy.rate().await? == 0 {
            proxy.setup(DEFAULT_SIGNAL_RATE_SECS).await?;
        }

        match self.technology().await? {
            tech @ Technology::Lte => Signal::decode(tech, &proxy.lte().await?),
            tech @ Technology::Nr5g => Signal::decode(tech, &proxy.nr5g().await?),
            other => Err(Error::UnsupportedTechnology(other)),
        }
    }

    /// Registers `observer` for periodic [`Signal`] updates, refreshed
    /// every `interval_secs` seconds.
    ///
    /// Requires [`ModemState::Registered`]. Same delivery and replacement
    /// semantics as [`Modem::observe_modem_state`].
    pub async fn observe_signal(
        &self,
        observer: impl Fn(Signal) + Send + Sync + 'static,
        interval_secs: u32,
    ) -> Result<()> {
        self.require_state(ModemState::Registered, "observe signal quality")
            .await?;

        let proxy = self.signal_proxy().await?;
        proxy.setup(interval_secs).await?;

        let task = tokio::spawn(async move {
            let mut lte_updates = proxy.receive_lte_changed().await;
            let mut nr5g_updates = proxy.receive_nr5g_changed().await;
            loop {
                let (tech, update) = tokio::select! {
                    Some(update) = lte_updates.next() => {
                        (Technology::Lte, update.get().await)
                    }
                    Some(update) = nr5g_updates.next() => {
                        (Technology::Nr5g, update.get().await)
                    }
                    else => break,
                };
                let raw = match update {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!(%err, "failed to read changed signal property");
                        continue;
                    }
                };
                match Signal::decode(tech, &raw) {
                    Ok(signal) => observer(signal),
                    Err(err) => warn!(%err, "dropping undecodable signal update"),
                }
            }
            debug!("signal update streams ended");
        });
        self.replace_observer(&self.observers.signal, task);
        Ok(())
    }

    /// Cell information for the serving and neighboring cells.
    ///
    /// Requires [`ModemState::Registered`]. Cells of technologies without
    /// a typed representation are dropped from the result.
    pub async fn cell_info(&self) -> Result<Vec<CellInfo>> {
        self.require_state(ModemState::Registered, "read cell information")
            .await?;

        let raw = self.modem_proxy().await?.get_cell_info().await?;
        Ok(raw.iter().filter_map(CellInfo::decode).collect())
    }

    /// The current cell location identifiers, when the daemon has gathered
    /// them. Requires [`ModemState::Registered`].
    pub async fn location(&self) -> Result<Option<Location>> {
        self.require_state(ModemState::Registered, "access cell location")
            .await?;

        let gathered = self.location_proxy().await?.get_location().await?;
        let Some(data) = lac_ci_entry(&gathered) else {
            return Ok(None);
        };
        let tech = self.technology().await?;
        Location::from_lac_ci(tech, &data)
    }

    /// Registers `observer` for cell location updates.
    ///
    /// Requires [`ModemState::Registered`]. Same delivery and replacement
    /// semantics as [`Modem::observe_modem_state`].
    pub async fn observe_location(
        &self,
        observer: impl Fn(Location) + Send + Sync + 'static,
    ) -> Result<()> {
        self.require_state(ModemState::Registered, "observe cell location")
            .await?;

        let proxy = self.location_proxy().await?;
        // second argument makes the daemon publish Location property updates
        proxy.setup(LOCATION_SOURCE_LAC_CI, true).await?;
        let modem_proxy = self.modem_proxy().await?;

        let task = tokio::spawn(async move {
            let mut updates = proxy.receive_location_changed().await;
            while let Some(update) = updates.next().await {
                let gathered = match update.get().await {
                    Ok(gathered) => gathered,
                    Err(err) => {
                        warn!(%err, "failed to read changed location property");
                        continue;
                    }
                };
                let Some(data) = lac_ci_entry(&gathered) else {
                    continue;
                };
                let tech = match modem_proxy.access_technologies().await {
                    Ok(code) => Technology::from_access_technology(code),
                    Err(err) => {
                        warn!(%err, "failed to read current technology");
                        continue;
                    }
                };
                match Location::from_lac_ci(tech, &data) {
                    Ok(Some(location)) => observer(location),
                    Ok(None) => debug!(%data, "dropping unparsable location update"),
                    Err(err) => warn!(%err, "dropping location update"),
                }
            }
            debug!("location update stream ended");
        });
        self.replace_observer(&self.observers.location, task);
        Ok(())
    }

    // ---- time ----

    /// The time reported by the modem, usually the network's, as an
    /// ISO-8601 formatted string. Requires [`ModemState::Enabled`].
    pub async fn network_time(&self) -> Result<String> {
        self.require_state(ModemState::Enabled, "get network time")
            .await?;
        Ok(self.time_proxy().await?.get_network_time().await?)
    }

    /// Same as [`Modem::network_time`] but as a unix timestamp. Returns 0
    /// when the reported string does not parse.
    pub async fn network_time_epoch(&self) -> Result<i64> {
        Ok(parse_network_time(&self.network_time().await?))
    }
}

impl fmt::Debug for Modem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modem").field("path", &self.path).finish()
    }
}

fn lac_ci_entry(gathered: &HashMap<u32, OwnedValue>) -> Option<String> {
    gathered.get(&LOCATION_SOURCE_LAC_CI).and_then(v_str)
}

/// Parses the daemon's timestamp as UTC, deliberately ignoring any timezone
/// suffix: epoch time is UTC and the daemon appends the local offset.
fn parse_network_time(time: &str) -> i64 {
    let seconds_part = time.get(..19).unwrap_or(time);
    NaiveDateTime::parse_from_str(seconds_part, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}
