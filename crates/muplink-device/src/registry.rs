use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use muplink_coap::{Method, Payload};
use muplink_serial::EndpointEnumerator;
use tracing::{debug, warn};

use crate::connection::{ConnectionConfig, DeviceConnection};
use crate::error::{DeviceError, Result};
use crate::events::DeviceEvents;
use crate::info::DeviceInfo;

/// Registry-level tuning knobs.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Baud rate for connections the scanner opens. Default: 115200.
    pub baud_rate: u32,
    /// Auto-scan period. Default: 5 s.
    pub scan_interval: Duration,
    /// Per-connection configuration applied to every opened device.
    pub connection: ConnectionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            baud_rate: muplink_serial::DEFAULT_BAUD_RATE,
            scan_interval: Duration::from_millis(5_000),
            connection: ConnectionConfig::default(),
        }
    }
}

struct Scanner {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Process-wide mapping from serial path to device connection.
///
/// Exactly one live connection exists per path. Entries appear when a
/// scan (or explicit `connect`) finds a board and vanish on explicit
/// `disconnect` or on the first scan that no longer lists the path.
pub struct DeviceRegistry {
    connections: Mutex<HashMap<String, Arc<DeviceConnection>>>,
    enumerator: Box<dyn EndpointEnumerator>,
    events: Arc<dyn DeviceEvents>,
    config: RegistryConfig,
    scanner: Mutex<Option<Scanner>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceRegistry {
    pub fn new(
        enumerator: Box<dyn EndpointEnumerator>,
        events: Arc<dyn DeviceEvents>,
        config: RegistryConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(HashMap::new()),
            enumerator,
            events,
            config,
            scanner: Mutex::new(None),
        })
    }

    /// Enumerate endpoints, connect the new ones, drop the vanished ones.
    ///
    /// Idempotent under concurrent calls: the membership check under the
    /// map lock guarantees one connection per path. A path that fails to
    /// open is skipped; the next scan retries it.
    pub fn scan(&self) -> Result<Vec<DeviceInfo>> {
        let found = self.enumerator.endpoints()?;
        let keys: Vec<String> = found.iter().map(|p| p.display().to_string()).collect();

        let vanished: Vec<String> = lock(&self.connections)
            .keys()
            .filter(|known| !keys.contains(known))
            .cloned()
            .collect();
        for path in vanished {
            debug!(path = %path, "endpoint vanished");
            self.disconnect(&path);
        }

        for path in &found {
            let key = path.display().to_string();
            if lock(&self.connections).contains_key(&key) {
                continue;
            }
            if let Err(err) = self.connect(path, self.config.baud_rate) {
                warn!(path = %key, %err, "endpoint failed to open");
            }
        }
        Ok(self.all())
    }

    /// Open one endpoint at an explicit baud rate.
    ///
    /// Returns the existing connection if the path is already live.
    pub fn connect(&self, path: impl AsRef<Path>, baud_rate: u32) -> Result<Arc<DeviceConnection>> {
        let path = path.as_ref();
        let key = path.display().to_string();
        if let Some(existing) = lock(&self.connections).get(&key) {
            return Ok(existing.clone());
        }

        let mut config = self.config.connection.clone();
        config.baud_rate = baud_rate;
        let conn = DeviceConnection::open_serial(path, config, self.events.clone())?;

        // A concurrent scan may have won the race; keep its connection.
        let mut map = lock(&self.connections);
        if let Some(existing) = map.get(&key) {
            conn.disconnect();
            return Ok(existing.clone());
        }
        map.insert(key, conn.clone());
        Ok(conn)
    }

    /// Register an already-built connection (loopbacks, emulated boards).
    ///
    /// Fails if the path is already live.
    pub fn attach(&self, conn: Arc<DeviceConnection>) -> Result<()> {
        let mut map = lock(&self.connections);
        let key = conn.path().to_string();
        if map.contains_key(&key) {
            conn.disconnect();
            return Err(DeviceError::AlreadyConnected(key));
        }
        map.insert(key, conn);
        Ok(())
    }

    /// Close and remove one endpoint. Returns whether it was present.
    pub fn disconnect(&self, path: &str) -> bool {
        let removed = lock(&self.connections).remove(path);
        match removed {
            Some(conn) => {
                conn.disconnect();
                true
            }
            None => false,
        }
    }

    /// Look up a live connection.
    pub fn get(&self, path: &str) -> Option<Arc<DeviceConnection>> {
        lock(&self.connections).get(path).cloned()
    }

    /// Info snapshots for every live connection, sorted by path.
    pub fn all(&self) -> Vec<DeviceInfo> {
        let mut infos: Vec<DeviceInfo> = lock(&self.connections)
            .values()
            .map(|conn| conn.info())
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    /// The uniform request entry point the HTTP glue calls.
    ///
    /// Errors from the connection pass through untouched.
    pub fn execute(
        &self,
        path: &str,
        method: Method,
        uri: &str,
        payload: Option<&[u8]>,
    ) -> Result<Payload> {
        let conn = self
            .get(path)
            .ok_or_else(|| DeviceError::DeviceNotFound(path.to_string()))?;
        conn.request(method, uri, payload)
    }

    /// Start (or restart) periodic scanning.
    ///
    /// Cancels any prior scanner, scans immediately, then every
    /// `interval`. Takes an owned handle (`registry.clone()` is cheap);
    /// the scanner itself only keeps a weak one.
    pub fn start_auto_scan(self: Arc<Self>, interval: Duration) {
        self.stop_auto_scan();
        let (stop_tx, stop_rx) = mpsc::channel();
        // A weak handle keeps the scanner from pinning the registry
        // alive; it winds down once the last external handle is gone.
        let registry = Arc::downgrade(&self);
        let handle = std::thread::Builder::new()
            .name("muplink-scan".to_string())
            .spawn(move || loop {
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                if let Err(err) = registry.scan() {
                    warn!(%err, "periodic scan failed");
                }
                drop(registry);
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            })
            .expect("spawning scan thread");
        *lock(&self.scanner) = Some(Scanner {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop periodic scanning. Connections stay up.
    pub fn stop_auto_scan(&self) {
        let scanner = lock(&self.scanner).take();
        if let Some(scanner) = scanner {
            let _ = scanner.stop.send(());
            let _ = scanner.handle.join();
        }
    }

    /// Terminal teardown: stop the scanner and close every connection,
    /// rejecting every outstanding waiter.
    pub fn shutdown(&self) {
        self.stop_auto_scan();
        let drained: Vec<Arc<DeviceConnection>> = lock(&self.connections).drain().map(|(_, c)| c).collect();
        for conn in drained {
            conn.disconnect();
        }
        debug!("registry shut down");
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
