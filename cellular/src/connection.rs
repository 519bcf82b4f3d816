use std::fmt;
use std::sync::{Arc, Mutex};

use cellular_dbus as mm;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zbus::zvariant::OwnedObjectPath;

use crate::error::{Error, Result};
use crate::telemetry::{v_str, v_u32, RawValueMap};

/// IP family of a connection (and its bearer). `MMBearerIpFamily` valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum IpType {
    Unknown = 0,
    V4 = 1 << 0,
    V6 = 1 << 1,
    /// Dual stack.
    V4V6 = 1 << 2,
}

impl IpType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::V4,
            2 => Self::V6,
            4 => Self::V4V6,
            _ => Self::Unknown,
        }
    }

    pub(crate) fn raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for IpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V4 => "IPv4",
            Self::V6 => "IPv6",
            Self::V4V6 => "IPv4+IPv6",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// IP configuration of an active connection, one per family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpConfig {
    pub ip_type: IpType,
    pub address: String,
    /// Network mask in CIDR notation.
    pub prefix: u32,
    pub gateway: String,
    pub dns1: String,
    pub dns2: String,
}

/// Byte counters of a connection's kernel interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Default)]
struct TrafficObserver(Mutex<Option<JoinHandle<()>>>);

impl Drop for TrafficObserver {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.0.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// One configured data tunnel (bearer) of a modem, active or not.
/// Obtain via [`crate::Modem::connections`].
#[derive(Clone)]
pub struct Connection {
    conn: zbus::Connection,
    path: OwnedObjectPath,
    observer: Arc<TrafficObserver>,
}

impl Connection {
    pub(crate) fn new(conn: zbus::Connection, path: OwnedObjectPath) -> Self {
        Self {
            conn,
            path,
            observer: Arc::new(TrafficObserver::default()),
        }
    }

    async fn bearer_proxy(&self) -> Result<mm::BearerProxy<'static>> {
        Ok(mm::BearerProxy::builder(&self.conn)
            .path(self.path.clone())?
            .build()
            .await?)
    }

    /// Whether the data path is currently up.
    pub async fn active(&self) -> Result<bool> {
        Ok(self.bearer_proxy().await?.connected().await?)
    }

    /// The access point name this connection was configured with.
    pub async fn apn(&self) -> Result<String> {
        let settings = self.bearer_proxy().await?.properties().await?;
        settings
            .get("apn")
            .and_then(v_str)
            .ok_or_else(|| Error::MissingKey("apn".to_owned()))
    }

    /// The IP family this connection was configured with.
    pub async fn ip_type(&self) -> Result<IpType> {
        let settings = self.bearer_proxy().await?.properties().await?;
        let raw = settings
            .get("ip-type")
            .and_then(v_u32)
            .ok_or_else(|| Error::MissingKey("ip-type".to_owned()))?;
        Ok(IpType::from_raw(raw))
    }

    /// The kernel network interface backing this connection, e.g. `wwan0`.
    pub async fn interface(&self) -> Result<String> {
        Ok(self.bearer_proxy().await?.interface().await?)
    }

    /// The IPv4 configuration; `None` unless the connection is active with
    /// a complete IPv4 setup.
    pub async fn ipv4_config(&self) -> Result<Option<IpConfig>> {
        let raw = self.bearer_proxy().await?.ip4_config().await?;
        Ok(decode_ip_config(IpType::V4, &raw))
    }

    /// The IPv6 configuration; `None` unless the connection is active with
    /// a complete IPv6 setup.
    pub async fn ipv6_config(&self) -> Result<Option<IpConfig>> {
        let raw = self.bearer_proxy().await?.ip6_config().await?;
        Ok(decode_ip_config(IpType::V6, &raw))
    }

    /// Resolves the network-manager device behind our kernel interface.
    /// That lookup failing means the statistics source is gone, which is
    /// reported as [`Error::ConnectionLost`].
    async fn statistics_device(&self) -> Result<OwnedObjectPath> {
        let iface = self.interface().await?;
        let network_manager = mm::NetworkManagerProxy::new(&self.conn).await?;
        network_manager
            .get_device_by_ip_iface(&iface)
            .await
            .map_err(Error::ConnectionLost)
    }

    async fn statistics_proxy(&self) -> Result<mm::DeviceStatisticsProxy<'static>> {
        let device = self.statistics_device().await?;
        Ok(mm::DeviceStatisticsProxy::builder(&self.conn)
            .path(device)?
            .build()
            .await?)
    }

    /// Current RX/TX byte counters of the connection's kernel interface.
    pub async fn traffic_stats(&self) -> Result<TrafficStats> {
        let stats = self.statistics_proxy().await?;
        Ok(TrafficStats {
            rx_bytes: stats.rx_bytes().await?,
            tx_bytes: stats.tx_bytes().await?,
        })
    }

    /// Registers `observer` for periodic [`TrafficStats`], refreshed every
    /// `interval_ms` milliseconds.
    ///
    /// The callback runs on the bus delivery task. Registering again
    /// replaces the previous observer.
    pub async fn observe_traffic_stats(
        &self,
        observer: impl Fn(TrafficStats) + Send + Sync + 'static,
        interval_ms: u32,
    ) -> Result<()> {
        let device = self.statistics_device().await?;
        let stats = mm::DeviceStatisticsProxy::builder(&self.conn)
            .path(device.clone())?
            .build()
            .await?;
        stats.set_refresh_rate_ms(interval_ms).await?;

        let properties = zbus::fdo::PropertiesProxy::builder(&self.conn)
            .destination(mm::NM_BUS_NAME)
            .and_then(|builder| builder.path(device))?
            .build()
            .await?;

        let task = tokio::spawn(async move {
            let mut changes = match properties.receive_properties_changed().await {
                Ok(changes) => changes,
                Err(err) => {
                    warn!(%err, "failed to subscribe to statistics updates");
                    return;
                }
            };
            while let Some(change) = changes.next().await {
                let Ok(args) = change.args() else {
                    continue;
                };
                // property updates for other interfaces of the device are
                // not traffic updates
                if args.interface_name.as_str() != mm::NM_STATISTICS_INTERFACE {
                    continue;
                }
                match (stats.rx_bytes().await, stats.tx_bytes().await) {
                    (Ok(rx_bytes), Ok(tx_bytes)) => observer(TrafficStats {
                        rx_bytes,
                        tx_bytes,
                    }),
                    (Err(err), _) | (_, Err(err)) => {
                        warn!(%err, "failed to read traffic counters");
                    }
                }
            }
            debug!("statistics update stream ended");
        });

        let mut slot = self
            .observer
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .finish()
    }
}

/// `None` unless every field of the configuration is present; the daemon
/// only fills these maps in while the bearer is connected.
fn decode_ip_config(ip_type: IpType, raw: &RawValueMap) -> Option<IpConfig> {
    Some(IpConfig {
        ip_type,
        address: raw.get("address").and_then(v_str)?,
        prefix: raw.get("prefix").and_then(v_u32)?,
        gateway: raw.get("gateway").and_then(v_str)?,
        dns1: raw.get("dns1").and_then(v_str)?,
        dns2: raw.get("dns2").and_then(v_str)?,
    })
}
