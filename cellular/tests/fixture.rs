//! Shared test fixture: a private session bus with mock ModemManager and
//! NetworkManager services on it, driven through the real client library.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dbus_launch::BusType;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{interface, Connection, SignalContext};

pub const MM_PATH: &str = "/org/freedesktop/ModemManager1";
pub const MM_BUS_NAME: &str = "org.freedesktop.ModemManager1";
pub const NM_BUS_NAME: &str = "org.freedesktop.NetworkManager";
pub const NM_PATH: &str = "/org/freedesktop/NetworkManager";
pub const NM_DEVICE_PATH: &str = "/org/freedesktop/NetworkManager/Devices/1";

pub const SIM_PIN: &str = "1234";
pub const SIM_PUK: &str = "12345678";

pub fn modem_path(id: u32) -> OwnedObjectPath {
    OwnedObjectPath::try_from(format!("/org/freedesktop/ModemManager1/Modem/{id}"))
        .unwrap()
}

pub fn sim_path(id: u32) -> OwnedObjectPath {
    OwnedObjectPath::try_from(format!("/org/freedesktop/ModemManager1/SIM/{id}"))
        .unwrap()
}

pub fn bearer_path(id: u32) -> OwnedObjectPath {
    OwnedObjectPath::try_from(format!("/org/freedesktop/ModemManager1/Bearer/{id}"))
        .unwrap()
}

pub fn ov<'a>(value: impl Into<Value<'a>>) -> OwnedValue {
    OwnedValue::try_from(value.into()).unwrap()
}

pub fn clone_map(map: &HashMap<String, OwnedValue>) -> HashMap<String, OwnedValue> {
    map.iter()
        .map(|(k, v)| (k.clone(), v.try_clone().unwrap()))
        .collect()
}

/// Polls `check` until it holds or a few seconds pass.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

// MMModemState / MMModemAccessTechnology values used by the mocks.
pub const STATE_DISABLED: i32 = 3;
pub const STATE_ENABLED: i32 = 6;
pub const STATE_REGISTERED: i32 = 8;
pub const STATE_CONNECTED: i32 = 11;
pub const ACCESS_TECH_UMTS: u32 = 1 << 5;
pub const ACCESS_TECH_LTE: u32 = 1 << 14;
pub const ACCESS_TECH_5GNR: u32 = 1 << 15;

#[derive(Clone)]
pub struct ModemConfig {
    pub imei: String,
    pub state: i32,
    pub power_state: u32,
    pub unlock_required: u32,
    pub access_tech: u32,
    pub own_numbers: Vec<String>,
    /// `/` means no SIM.
    pub sim: OwnedObjectPath,
    pub bearers: Vec<OwnedObjectPath>,
    pub location_data: String,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            imei: "353338976168895".to_owned(),
            state: STATE_REGISTERED,
            power_state: 3,
            unlock_required: 1, // unlocked
            access_tech: ACCESS_TECH_LTE,
            own_numbers: vec![],
            sim: OwnedObjectPath::try_from("/").unwrap(),
            bearers: vec![],
            location_data: "262,01,1A2B,0000A1B2,00112233".to_owned(),
        }
    }
}

/// Shared handles into one mocked modem, for poking state from tests.
pub struct ModemHandles {
    pub path: OwnedObjectPath,
    pub cfg: Arc<Mutex<ModemConfig>>,
    pub signal_rate: Arc<Mutex<u32>>,
    pub lte_rsrp: Arc<Mutex<f64>>,
    pub location_setup: Arc<Mutex<Vec<(u32, bool)>>>,
}

pub struct Fixture {
    _dbusd: dbus_launch::Daemon,
    /// Serves the mock daemons.
    pub service: Connection,
    /// Handed to the library under test.
    pub client: Connection,
}

impl Fixture {
    /// A bus with mock ModemManager and NetworkManager services and no
    /// modems yet.
    pub async fn new() -> Self {
        let fx = Self::bare().await;
        let server = fx.service.object_server();

        // the object manager must exist before any name or child object
        // so that announcements cover everything
        server.at(MM_PATH, zbus::fdo::ObjectManager).await.unwrap();
        server.at(MM_PATH, MockDaemon).await.unwrap();
        fx.service.request_name(MM_BUS_NAME).await.unwrap();

        server.at(NM_PATH, MockNetworkManager).await.unwrap();
        server
            .at(
                NM_DEVICE_PATH,
                MockDeviceStatistics {
                    refresh_rate_ms: Arc::new(Mutex::new(0)),
                    rx_bytes: Arc::new(Mutex::new(0)),
                    tx_bytes: Arc::new(Mutex::new(0)),
                },
            )
            .await
            .unwrap();
        fx.service.request_name(NM_BUS_NAME).await.unwrap();

        drop(server);
        fx
    }

    /// Just the private bus, no services. For failure-path tests.
    pub async fn bare() -> Self {
        let dbusd = tokio::task::spawn_blocking(|| {
            dbus_launch::Launcher::daemon()
                .bus_type(BusType::Session)
                .launch()
                .expect("failed to launch dbus-daemon")
        })
        .await
        .expect("task panicked");

        let service = zbus::ConnectionBuilder::address(dbusd.address())
            .unwrap()
            .build()
            .await
            .unwrap();
        let client = zbus::ConnectionBuilder::address(dbusd.address())
            .unwrap()
            .build()
            .await
            .unwrap();

        Fixture {
            _dbusd: dbusd,
            service,
            client,
        }
    }

    /// Serves a mocked modem. The `Modem` interface is added last so that
    /// by the time clients react to any announcement for this path, the
    /// other interfaces are in place.
    pub async fn add_modem(&self, id: u32, cfg: ModemConfig) -> ModemHandles {
        let path = modem_path(id);
        let cfg = Arc::new(Mutex::new(cfg));
        let signal_rate = Arc::new(Mutex::new(0));
        let lte_rsrp = Arc::new(Mutex::new(-104.0));
        let location_setup = Arc::new(Mutex::new(Vec::new()));

        let sim = cfg.lock().unwrap().sim.clone();
        let server = self.service.object_server();
        if sim.as_str() != "/" {
            server
                .at(
                    sim.clone(),
                    MockSim {
                        unlocked: Arc::new(Mutex::new(false)),
                    },
                )
                .await
                .unwrap();
        }
        server
            .at(path.clone(), Mock3gpp { cfg: cfg.clone() })
            .await
            .unwrap();
        server
            .at(
                path.clone(),
                MockSignal {
                    rate: signal_rate.clone(),
                    lte_rsrp: lte_rsrp.clone(),
                },
            )
            .await
            .unwrap();
        server
            .at(
                path.clone(),
                MockLocation {
                    cfg: cfg.clone(),
                    setup_calls: location_setup.clone(),
                },
            )
            .await
            .unwrap();
        server.at(path.clone(), MockTime).await.unwrap();
        server
            .at(
                path.clone(),
                MockModem {
                    cfg: cfg.clone(),
                    bearer_seq: Arc::new(AtomicU32::new(0)),
                },
            )
            .await
            .unwrap();

        ModemHandles {
            path,
            cfg,
            signal_rate,
            lte_rsrp,
            location_setup,
        }
    }

    pub async fn remove_modem(&self, id: u32) {
        let path = modem_path(id);
        let server = self.service.object_server();
        server
            .remove::<MockModem, _>(path.clone())
            .await
            .unwrap();
        server.remove::<Mock3gpp, _>(path.clone()).await.unwrap();
        server.remove::<MockSignal, _>(path.clone()).await.unwrap();
        server
            .remove::<MockLocation, _>(path.clone())
            .await
            .unwrap();
        server.remove::<MockTime, _>(path.clone()).await.unwrap();
    }

    /// Serves a bearer object directly and registers it on the modem.
    pub async fn add_bearer(
        &self,
        modem: &ModemHandles,
        id: u32,
        iface: &str,
        connected: bool,
    ) -> OwnedObjectPath {
        let path = bearer_path(id);
        let settings = HashMap::from([
            ("apn".to_owned(), ov("em")),
            ("ip-type".to_owned(), ov(4u32)),
        ]);
        self.service
            .object_server()
            .at(
                path.clone(),
                MockBearer {
                    settings: Arc::new(Mutex::new(settings)),
                    connected: Arc::new(Mutex::new(connected)),
                    iface: iface.to_owned(),
                },
            )
            .await
            .unwrap();
        modem.cfg.lock().unwrap().bearers.push(path.clone());
        path
    }

    pub async fn emit_state_change(&self, id: u32, old: i32, new: i32) {
        let iface = self
            .service
            .object_server()
            .interface::<_, MockModem>(modem_path(id))
            .await
            .unwrap();
        MockModem::modem_state_changed(iface.signal_context(), old, new, 0)
            .await
            .unwrap();
    }

    /// Updates the mocked LTE RSRP and publishes the property change.
    pub async fn emit_signal_update(&self, modem: &ModemHandles, rsrp: f64) {
        *modem.lte_rsrp.lock().unwrap() = rsrp;
        let iface = self
            .service
            .object_server()
            .interface::<_, MockSignal>(modem.path.clone())
            .await
            .unwrap();
        iface
            .get()
            .await
            .lte_changed(iface.signal_context())
            .await
            .unwrap();
    }

    /// Updates the mocked location string and publishes the property change.
    pub async fn emit_location_update(&self, modem: &ModemHandles, data: &str) {
        modem.cfg.lock().unwrap().location_data = data.to_owned();
        let iface = self
            .service
            .object_server()
            .interface::<_, MockLocation>(modem.path.clone())
            .await
            .unwrap();
        iface
            .get()
            .await
            .location_changed(iface.signal_context())
            .await
            .unwrap();
    }

    /// Updates the mocked traffic counters and publishes the change.
    pub async fn emit_traffic_update(&self, rx: u64, tx: u64) {
        let iface = self
            .service
            .object_server()
            .interface::<_, MockDeviceStatistics>(NM_DEVICE_PATH)
            .await
            .unwrap();
        {
            let stats = iface.get().await;
            *stats.rx_bytes.lock().unwrap() = rx;
            *stats.tx_bytes.lock().unwrap() = tx;
        }
        iface
            .get()
            .await
            .rx_bytes_changed(iface.signal_context())
            .await
            .unwrap();
    }

    pub async fn statistics_refresh_rate(&self) -> u32 {
        let iface = self
            .service
            .object_server()
            .interface::<_, MockDeviceStatistics>(NM_DEVICE_PATH)
            .await
            .unwrap();
        let rate = *iface.get().await.refresh_rate_ms.lock().unwrap();
        rate
    }
}

struct MockDaemon;

#[interface(name = "org.freedesktop.ModemManager1")]
impl MockDaemon {
    #[zbus(property)]
    fn version(&self) -> String {
        "1.20.6".to_owned()
    }
}

pub struct MockModem {
    cfg: Arc<Mutex<ModemConfig>>,
    bearer_seq: Arc<AtomicU32>,
}

#[interface(name = "org.freedesktop.ModemManager1.Modem")]
impl MockModem {
    fn enable(&self, enable: bool) {
        let mut cfg = self.cfg.lock().unwrap();
        cfg.state = if enable { STATE_ENABLED } else { STATE_DISABLED };
    }

    fn reset(&self) {}

    fn set_power_state(&self, state: u32) {
        self.cfg.lock().unwrap().power_state = state;
    }

    async fn create_bearer(
        &self,
        properties: HashMap<String, OwnedValue>,
        #[zbus(connection)] conn: &Connection,
    ) -> zbus::fdo::Result<OwnedObjectPath> {
        let id = self.bearer_seq.fetch_add(1, Ordering::SeqCst);
        let path = bearer_path(id);
        conn.object_server()
            .at(
                path.clone(),
                MockBearer {
                    settings: Arc::new(Mutex::new(properties)),
                    connected: Arc::new(Mutex::new(false)),
                    iface: "wwan0".to_owned(),
                },
            )
            .await?;
        self.cfg.lock().unwrap().bearers.push(path.clone());
        Ok(path)
    }

    fn get_cell_info(&self) -> Vec<HashMap<String, OwnedValue>> {
        vec![
            // serving LTE cell
            HashMap::from([
                ("cell-type".to_owned(), ov(5u32)),
                ("serving".to_owned(), ov(true)),
                ("ci".to_owned(), ov("0197763E")),
                ("physical-ci".to_owned(), ov("1A3")),
                ("earfcn".to_owned(), ov(6300u32)),
                ("rsrp".to_owned(), ov(-104.0)),
                ("snr".to_owned(), ov(2.0)),
                ("operator-id".to_owned(), ov("26201")),
                ("tac".to_owned(), ov("00C945")),
            ]),
            // neighboring NR cell
            HashMap::from([
                ("cell-type".to_owned(), ov(6u32)),
                ("serving".to_owned(), ov(false)),
                ("physical-ci".to_owned(), ov("2F0")),
                ("nrarfcn".to_owned(), ov(640_000u32)),
            ]),
            // GSM cell, no typed representation
            HashMap::from([
                ("cell-type".to_owned(), ov(2u32)),
                ("serving".to_owned(), ov(false)),
            ]),
        ]
    }

    #[zbus(name = "StateChanged", signal)]
    async fn modem_state_changed(
        ctxt: &SignalContext<'_>,
        old: i32,
        new: i32,
        reason: u32,
    ) -> zbus::Result<()>;

    #[zbus(property)]
    fn manufacturer(&self) -> String {
        "Contoso".to_owned()
    }

    #[zbus(property)]
    fn model(&self) -> String {
        "CM95-EU".to_owned()
    }

    #[zbus(property)]
    fn revision(&self) -> String {
        "25.30.608".to_owned()
    }

    #[zbus(property)]
    fn own_numbers(&self) -> Vec<String> {
        self.cfg.lock().unwrap().own_numbers.clone()
    }

    #[zbus(property, name = "State")]
    fn modem_state(&self) -> i32 {
        self.cfg.lock().unwrap().state
    }

    #[zbus(property)]
    fn power_state(&self) -> u32 {
        self.cfg.lock().unwrap().power_state
    }

    #[zbus(property)]
    fn unlock_required(&self) -> u32 {
        self.cfg.lock().unwrap().unlock_required
    }

    #[zbus(property)]
    fn access_technologies(&self) -> u32 {
        self.cfg.lock().unwrap().access_tech
    }

    #[zbus(property)]
    fn sim(&self) -> OwnedObjectPath {
        self.cfg.lock().unwrap().sim.clone()
    }

    #[zbus(property)]
    fn bearers(&self) -> Vec<OwnedObjectPath> {
        self.cfg.lock().unwrap().bearers.clone()
    }
}

pub struct Mock3gpp {
    cfg: Arc<Mutex<ModemConfig>>,
}

#[interface(name = "org.freedesktop.ModemManager1.Modem.Modem3gpp")]
impl Mock3gpp {
    #[zbus(property)]
    fn imei(&self) -> String {
        self.cfg.lock().unwrap().imei.clone()
    }

    #[zbus(property)]
    fn operator_code(&self) -> String {
        "26201".to_owned()
    }

    #[zbus(property)]
    fn operator_name(&self) -> String {
        "TestNet".to_owned()
    }
}

pub struct MockSignal {
    rate: Arc<Mutex<u32>>,
    lte_rsrp: Arc<Mutex<f64>>,
}

#[interface(name = "org.freedesktop.ModemManager1.Modem.Signal")]
impl MockSignal {
    fn setup(&self, rate: u32) {
        *self.rate.lock().unwrap() = rate;
    }

    #[zbus(property)]
    fn rate(&self) -> u32 {
        *self.rate.lock().unwrap()
    }

    #[zbus(property)]
    fn lte(&self) -> HashMap<String, OwnedValue> {
        HashMap::from([
            ("rsrp".to_owned(), ov(*self.lte_rsrp.lock().unwrap())),
            ("rsrq".to_owned(), ov(-11.0)),
            ("rssi".to_owned(), ov(-70.0)),
            ("snr".to_owned(), ov(4.5)),
        ])
    }

    #[zbus(property)]
    fn nr5g(&self) -> HashMap<String, OwnedValue> {
        HashMap::new()
    }
}

pub struct MockLocation {
    cfg: Arc<Mutex<ModemConfig>>,
    setup_calls: Arc<Mutex<Vec<(u32, bool)>>>,
}

#[interface(name = "org.freedesktop.ModemManager1.Modem.Location")]
impl MockLocation {
    fn setup(&self, sources: u32, signal_location: bool) {
        self.setup_calls.lock().unwrap().push((sources, signal_location));
    }

    fn get_location(&self) -> HashMap<u32, OwnedValue> {
        HashMap::from([(1u32, ov(self.cfg.lock().unwrap().location_data.clone()))])
    }

    #[zbus(property)]
    fn location(&self) -> HashMap<u32, OwnedValue> {
        HashMap::from([(1u32, ov(self.cfg.lock().unwrap().location_data.clone()))])
    }
}

pub struct MockTime;

#[interface(name = "org.freedesktop.ModemManager1.Modem.Time")]
impl MockTime {
    fn get_network_time(&self) -> String {
        "2024-05-01T12:00:00+02".to_owned()
    }
}

#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.freedesktop.ModemManager1.Error.MobileEquipment")]
pub enum MobileEquipmentError {
    #[zbus(error)]
    ZBus(zbus::Error),
    IncorrectPassword(String),
    IncorrectParameters(String),
}

pub struct MockSim {
    pub unlocked: Arc<Mutex<bool>>,
}

#[interface(name = "org.freedesktop.ModemManager1.Sim")]
impl MockSim {
    fn send_pin(&self, pin: String) -> Result<(), MobileEquipmentError> {
        if pin.len() != 4 {
            return Err(MobileEquipmentError::IncorrectParameters(
                "Invalid PIN".to_owned(),
            ));
        }
        if pin != SIM_PIN {
            return Err(MobileEquipmentError::IncorrectPassword(
                "Incorrect password".to_owned(),
            ));
        }
        *self.unlocked.lock().unwrap() = true;
        Ok(())
    }

    fn send_puk(&self, puk: String, pin: String) -> Result<(), MobileEquipmentError> {
        if puk.len() != 8 || pin.len() != 4 {
            return Err(MobileEquipmentError::IncorrectParameters(
                "Invalid PUK or PIN".to_owned(),
            ));
        }
        if puk != SIM_PUK {
            return Err(MobileEquipmentError::IncorrectPassword(
                "Incorrect password".to_owned(),
            ));
        }
        *self.unlocked.lock().unwrap() = true;
        Ok(())
    }

    #[zbus(property)]
    fn active(&self) -> bool {
        true
    }

    #[zbus(property)]
    fn imsi(&self) -> String {
        "262011234567890".to_owned()
    }

    #[zbus(property)]
    fn sim_identifier(&self) -> String {
        "89490200001123456789".to_owned()
    }

    #[zbus(property)]
    fn operator_identifier(&self) -> String {
        "26201".to_owned()
    }

    #[zbus(property)]
    fn operator_name(&self) -> String {
        "TestNet".to_owned()
    }
}

pub struct MockBearer {
    settings: Arc<Mutex<HashMap<String, OwnedValue>>>,
    connected: Arc<Mutex<bool>>,
    iface: String,
}

#[interface(name = "org.freedesktop.ModemManager1.Bearer")]
impl MockBearer {
    fn connect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    #[zbus(property)]
    fn connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    #[zbus(property)]
    fn interface(&self) -> String {
        self.iface.clone()
    }

    #[zbus(property)]
    fn properties(&self) -> HashMap<String, OwnedValue> {
        clone_map(&self.settings.lock().unwrap())
    }

    #[zbus(property)]
    fn ip4_config(&self) -> HashMap<String, OwnedValue> {
        if !*self.connected.lock().unwrap() {
            return HashMap::new();
        }
        HashMap::from([
            ("address".to_owned(), ov("10.11.12.2")),
            ("prefix".to_owned(), ov(30u32)),
            ("gateway".to_owned(), ov("10.11.12.1")),
            ("dns1".to_owned(), ov("10.11.12.1")),
            ("dns2".to_owned(), ov("9.9.9.9")),
        ])
    }

    #[zbus(property)]
    fn ip6_config(&self) -> HashMap<String, OwnedValue> {
        HashMap::new()
    }
}

struct MockNetworkManager;

#[interface(name = "org.freedesktop.NetworkManager")]
impl MockNetworkManager {
    fn get_device_by_ip_iface(
        &self,
        iface: String,
    ) -> zbus::fdo::Result<OwnedObjectPath> {
        if iface == "wwan0" {
            Ok(OwnedObjectPath::try_from(NM_DEVICE_PATH).unwrap())
        } else {
            Err(zbus::fdo::Error::UnknownObject(format!(
                "no device for interface {iface}"
            )))
        }
    }
}

pub struct MockDeviceStatistics {
    pub refresh_rate_ms: Arc<Mutex<u32>>,
    pub rx_bytes: Arc<Mutex<u64>>,
    pub tx_bytes: Arc<Mutex<u64>>,
}

#[interface(name = "org.freedesktop.NetworkManager.Device.Statistics")]
impl MockDeviceStatistics {
    #[zbus(property)]
    fn refresh_rate_ms(&self) -> u32 {
        *self.refresh_rate_ms.lock().unwrap()
    }

    #[zbus(property)]
    fn set_refresh_rate_ms(&self, value: u32) {
        *self.refresh_rate_ms.lock().unwrap() = value;
    }

    #[zbus(property)]
    fn rx_bytes(&self) -> u64 {
        *self.rx_bytes.lock().unwrap()
    }

    #[zbus(property)]
    fn tx_bytes(&self) -> u64 {
        *self.tx_bytes.lock().unwrap()
    }
}
