//! A single live device socket as seen by the rest of the relay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, watch};

/// Close code sent to the oldest socket when a device exceeds its limit.
pub const CLOSE_CONNECTION_LIMIT: u16 = 4000;

/// Work for a connection's socket writer, drained in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    Ping,
    Close { code: u16, reason: String },
}

/// Handle to one device socket.
///
/// Writes go through the outbound queue, so the socket writer task is the
/// only thing touching the sink.
#[derive(Debug)]
pub struct DeviceConnection {
    pub id: String,
    pub device_id: String,
    pub created_at: Instant,
    alive: AtomicBool,
    open: AtomicBool,
    outbound: mpsc::Sender<Outbound>,
    terminate: watch::Sender<bool>,
}

impl DeviceConnection {
    pub(super) fn new(device_id: String, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id,
            created_at: Instant::now(),
            alive: AtomicBool::new(true),
            open: AtomicBool::new(true),
            outbound,
            terminate: watch::Sender::new(false),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Queue a text frame. Returns false if the connection is gone.
    pub async fn send_frame(&self, frame: String) -> bool {
        self.is_open() && self.outbound.send(Outbound::Frame(frame)).await.is_ok()
    }

    /// Record a pong.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Clear the liveness flag, returning what it was.
    pub(super) fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    pub(super) fn queue_ping(&self) -> bool {
        self.outbound.try_send(Outbound::Ping).is_ok()
    }

    /// Graceful close with a status code. Falls back to [`terminate`] when
    /// the close frame cannot be queued.
    ///
    /// [`terminate`]: Self::terminate
    pub fn close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::AcqRel) {
            let queued = self.outbound.try_send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
            if queued.is_err() {
                self.terminate();
            }
        }
    }

    /// Drop the socket without a close handshake.
    pub fn terminate(&self) {
        self.open.store(false, Ordering::Release);
        self.terminate.send_replace(true);
    }

    pub(super) fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Resolves once [`terminate`](Self::terminate) is called.
    pub fn termination(&self) -> watch::Receiver<bool> {
        self.terminate.subscribe()
    }
}
