//! Per-device registry of live sockets.
//!
//! Each device holds at most `max_per_device` connections in arrival order.
//! Admitting one more closes the front of the queue first (FIFO, not LRU).
//! Liveness is a flag cleared before every ping and set by the pong; a flag
//! still clear on the next tick means the socket is a zombie and is dropped.

mod connection;
mod heartbeat;


use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

pub use connection::{CLOSE_CONNECTION_LIMIT, DeviceConnection, Outbound};
pub use heartbeat::spawn_heartbeat_task;

pub(crate) const OUTBOUND_CAPACITY: usize = 64;

/// What the socket task needs after admission.
#[derive(Debug)]
pub struct Registration {
    pub connection: Arc<DeviceConnection>,
    pub outbound: mpsc::Receiver<Outbound>,
}

/// Outcome of one heartbeat pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub pinged: usize,
    pub reaped: usize,
    /// Connections whose queue was full, left alive until the next tick.
    pub skipped: usize,
}

#[derive(Clone)]
pub struct ConnectionRegistry {
    devices: Arc<RwLock<HashMap<String, VecDeque<Arc<DeviceConnection>>>>>,
    max_per_device: usize,
}

impl ConnectionRegistry {
    pub fn new(max_per_device: usize) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            max_per_device: max_per_device.max(1),
        }
    }

    /// Admit a connection for `device_id`, evicting the oldest one first if
    /// the device is at its limit.
    pub async fn register(&self, device_id: &str) -> Registration {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let conn = Arc::new(DeviceConnection::new(device_id.to_string(), tx));

        let mut devices = self.devices.write().await;
        let queue = devices.entry(device_id.to_string()).or_default();
        while queue.len() >= self.max_per_device {
            let Some(oldest) = queue.pop_front() else {
                break;
            };
            oldest.close(CLOSE_CONNECTION_LIMIT, "connection limit exceeded");
            info!(
                device_id = %device_id,
                connection_id = %oldest.id,
                "Evicted oldest connection"
            );
        }
        queue.push_back(Arc::clone(&conn));
        let count = queue.len();
        drop(devices);

        info!(device_id = %device_id, connection_id = %conn.id, count, "Connection registered");
        Registration {
            connection: conn,
            outbound: rx,
        }
    }

    /// Remove a connection. No-op if it was already evicted or reaped.
    pub async fn unregister(&self, conn: &DeviceConnection) -> bool {
        conn.mark_closed();
        let mut devices = self.devices.write().await;
        let Some(queue) = devices.get_mut(&conn.device_id) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|c| c.id != conn.id);
        let removed = queue.len() < before;
        if queue.is_empty() {
            devices.remove(&conn.device_id);
        }
        drop(devices);

        if removed {
            info!(device_id = %conn.device_id, connection_id = %conn.id, "Connection unregistered");
        } else {
            debug!(connection_id = %conn.id, "Connection already removed");
        }
        removed
    }

    /// Sorted ids of devices with at least one connection.
    pub async fn list_online_device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn count_connections(&self) -> usize {
        self.devices.read().await.values().map(VecDeque::len).sum()
    }

    pub async fn count_online_devices(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Live connections of one device, oldest first.
    pub async fn connections_for(&self, device_id: &str) -> Vec<Arc<DeviceConnection>> {
        self.devices
            .read()
            .await
            .get(device_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// One heartbeat pass: reap connections that missed the last ping, ping
    /// the rest.
    pub async fn heartbeat_tick(&self) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        let mut devices = self.devices.write().await;

        for (device_id, queue) in devices.iter_mut() {
            queue.retain(|conn| {
                if !conn.take_alive() {
                    warn!(
                        device_id = %device_id,
                        connection_id = %conn.id,
                        "No pong since last heartbeat, terminating"
                    );
                    conn.terminate();
                    report.reaped += 1;
                    return false;
                }
                if conn.queue_ping() {
                    report.pinged += 1;
                } else {
                    // Never pinged, so it cannot have missed a pong.
                    conn.mark_alive();
                    report.skipped += 1;
                }
                true
            });
        }
        devices.retain(|_, queue| !queue.is_empty());
        drop(devices);

        if report.reaped > 0 {
            info!(reaped = report.reaped, pinged = report.pinged, "Heartbeat reaped zombies");
        }
        report
    }
}
