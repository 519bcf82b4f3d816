use std::sync::{Arc, Mutex, MutexGuard};

use cellular_dbus as mm;
use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::fdo::ObjectManagerProxy;
use zbus::zvariant::OwnedObjectPath;

use crate::error::{Error, Result};
use crate::modem::Modem;

/// What [`ModemManager::await_modem`] should wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitTarget {
    /// The next modem to be announced, whichever it is.
    Any,
    /// The modem with this IMEI.
    Imei(String),
}

struct PendingAwait {
    target: AwaitTarget,
    tx: oneshot::Sender<Result<Modem>>,
}

#[derive(Default)]
struct Inner {
    modems: Vec<Modem>,
    pending: Option<PendingAwait>,
}

/// Resolves once the awaited modem has been announced.
///
/// No timeout is imposed here; callers wrap [`ModemWaiter::wait`] in their
/// own `tokio::time::timeout` as needed.
pub struct ModemWaiter {
    rx: oneshot::Receiver<Result<Modem>>,
}

impl ModemWaiter {
    /// Waits until the matching modem appears. Fails with
    /// [`Error::Cancelled`] when a newer await supersedes this one or the
    /// registry goes away.
    pub async fn wait(self) -> Result<Modem> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Cancelled),
        }
    }
}

/// Registry of the modems managed by the daemon.
///
/// Connects to the daemon, mirrors its set of modem objects, and hands out
/// [`Modem`] instances. Keep it alive while those instances are in use: it
/// owns the background task that tracks announcements.
pub struct ModemManager {
    conn: zbus::Connection,
    inner: Arc<Mutex<Inner>>,
    watcher: JoinHandle<()>,
}

impl ModemManager {
    /// Connects to the daemon on the system bus.
    ///
    /// The returned registry is fully populated: modems the daemon already
    /// manages are present without waiting for announcements. Fails with
    /// [`Error::ServiceUnavailable`] when the bus or the daemon cannot be
    /// reached.
    pub async fn connect() -> Result<Self> {
        let conn = zbus::Connection::system()
            .await
            .map_err(Error::ServiceUnavailable)?;
        Self::connect_with(conn).await
    }

    /// Like [`ModemManager::connect`], but on an already established bus
    /// connection. Useful when the daemon lives on a non-system bus, e.g.
    /// in tests.
    pub async fn connect_with(conn: zbus::Connection) -> Result<Self> {
        let inner = Arc::new(Mutex::new(Inner::default()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_objects(
            conn.clone(),
            Arc::clone(&inner),
            ready_tx,
        ));

        match ready_rx.await {
            Ok(Ok(modems)) => {
                info!(modems, "connected to the modem management service");
            }
            Ok(Err(err)) => {
                watcher.abort();
                return Err(Error::ServiceUnavailable(err));
            }
            Err(_) => {
                return Err(Error::ServiceUnavailable(zbus::Error::Failure(
                    "object watcher died during startup".into(),
                )));
            }
        }

        Ok(Self {
            conn,
            inner,
            watcher,
        })
    }

    /// Whether any modem is currently available.
    pub fn modems_available(&self) -> bool {
        !self.lock().modems.is_empty()
    }

    /// The first available modem, if there is any.
    pub fn any_modem(&self) -> Option<Modem> {
        self.lock().modems.first().cloned()
    }

    /// A point-in-time copy of all available modems.
    pub fn available_modems(&self) -> Vec<Modem> {
        self.lock().modems.clone()
    }

    /// Waits for a modem to become available.
    ///
    /// At most one await is outstanding per registry: a newer call cancels
    /// an unresolved older one, which then fails with [`Error::Cancelled`].
    ///
    /// Matching by IMEI compares against the IMEI read when the modem is
    /// announced. A daemon that announces a modem before its IMEI is
    /// readable will never match it; waiting for [`AwaitTarget::Any`] does
    /// not have this problem.
    pub fn await_modem(&self, target: AwaitTarget) -> ModemWaiter {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        if let Some(previous) = inner.pending.replace(PendingAwait { target, tx }) {
            debug!("replacing outstanding modem await");
            let _ = previous.tx.send(Err(Error::Cancelled));
        }
        ModemWaiter { rx }
    }

    /// Resets `modem` and waits for it to come back, returning the new
    /// handle. The old handle, and any SIM or connection obtained from it,
    /// is invalid afterwards.
    pub async fn reset_modem(&self, modem: &Modem) -> Result<Modem> {
        // the IMEI survives the power cycle and identifies the successor
        let imei = modem.imei().await?;
        let waiter = self.await_modem(AwaitTarget::Imei(imei));
        modem.reset().await?;
        waiter.wait().await
    }

    /// The version string of the management daemon.
    pub async fn version(&self) -> Result<String> {
        Ok(mm::ModemManager1Proxy::new(&self.conn)
            .await?
            .version()
            .await?)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

impl Drop for ModemManager {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn is_modem_path(path: &OwnedObjectPath) -> bool {
    path.as_str().starts_with(mm::MM_MODEM_PATH_PREFIX)
}

/// Mirrors the daemon's object set into `inner`. Reports startup success
/// or failure through `ready` once the announcement streams are live and
/// the initial enumeration is done, then keeps consuming announcements.
async fn watch_objects(
    conn: zbus::Connection,
    inner: Arc<Mutex<Inner>>,
    ready: oneshot::Sender<zbus::Result<usize>>,
) {
    let setup = async {
        let object_manager = ObjectManagerProxy::builder(&conn)
            .destination(mm::MM_BUS_NAME)?
            .path(mm::MM_PATH)?
            .build()
            .await?;

        // subscribe before enumerating so no announcement falls through
        let added = object_manager.receive_interfaces_added().await?;
        let removed = object_manager.receive_interfaces_removed().await?;
        let managed = object_manager.get_managed_objects().await?;
        Ok::<_, zbus::Error>((added, removed, managed))
    };

    let (mut added, mut removed, managed) = match setup.await {
        Ok(streams) => streams,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    {
        let mut guard = lock(&inner);
        for (path, _interfaces) in managed {
            if is_modem_path(&path) {
                guard.modems.push(Modem::new(conn.clone(), path));
            }
        }
        let _ = ready.send(Ok(guard.modems.len()));
    }

    loop {
        tokio::select! {
            Some(event) = added.next() => {
                let path = match event.args() {
                    Ok(args) => OwnedObjectPath::from(args.object_path),
                    Err(err) => {
                        warn!(%err, "dropping malformed object announcement");
                        continue;
                    }
                };
                if is_modem_path(&path) {
                    handle_added(&conn, &inner, path).await;
                }
            }
            Some(event) = removed.next() => {
                match event.args() {
                    Ok(args) => handle_removed(&inner, args.object_path.as_str()),
                    Err(err) => warn!(%err, "dropping malformed object removal"),
                }
            }
            else => break,
        }
    }
    debug!("object manager notification streams ended");
}

async fn handle_added(
    conn: &zbus::Connection,
    inner: &Arc<Mutex<Inner>>,
    path: OwnedObjectPath,
) {
    // daemons announce interface additions per object; one entry per path
    if lock(inner).modems.iter().any(|m| m.path() == &path) {
        debug!(path = %path, "additional interfaces for a known modem");
        return;
    }

    let modem = Modem::new(conn.clone(), path);
    debug!(path = %modem.path(), "modem appeared");

    // peek at the pending await before taking the lock: matching by IMEI
    // is a remote read and must not happen under it
    let target = lock(inner).pending.as_ref().map(|p| p.target.clone());
    let matched = match &target {
        None => false,
        Some(AwaitTarget::Any) => true,
        Some(AwaitTarget::Imei(wanted)) => match modem.imei().await {
            Ok(imei) => imei == *wanted,
            Err(err) => {
                warn!(
                    %err,
                    path = %modem.path(),
                    "could not read IMEI of announced modem"
                );
                false
            }
        },
    };

    let mut guard = lock(inner);
    guard.modems.push(modem.clone());
    // only resolve if the await is still the one the match ran against
    if matched && target.as_ref() == guard.pending.as_ref().map(|p| &p.target) {
        if let Some(pending) = guard.pending.take() {
            debug!(path = %modem.path(), "resolving awaited modem");
            let _ = pending.tx.send(Ok(modem));
        }
    }
}

fn handle_removed(inner: &Arc<Mutex<Inner>>, path: &str) {
    let mut guard = lock(inner);
    let before = guard.modems.len();
    guard.modems.retain(|modem| modem.path().as_str() != path);
    if guard.modems.len() != before {
        debug!(path, "modem removed");
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
