use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{MessagePort, PortEvent};

/// Default ceiling for memory ports: 64 MiB, the Chromium extension limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// In-process message port.
///
/// Each posted message is serialized, measured against the ceiling, and
/// delivered to the peer as a freshly parsed value, so the peer never shares
/// memory with the sender. Ports are created in connected pairs.
#[derive(Debug)]
pub struct MemoryPort {
    name: &'static str,
    tx: Sender<PortEvent>,
    rx: Receiver<PortEvent>,
    max_message_size: usize,
    disconnected: bool,
}

impl MemoryPort {
    /// Create a connected pair with the default 64 MiB ceiling.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_limit(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a connected pair that refuses messages over `max_message_size` bytes.
    pub fn pair_with_limit(max_message_size: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        let a = Self {
            name: "portA",
            tx: a_tx,
            rx: a_rx,
            max_message_size,
            disconnected: false,
        };
        let b = Self {
            name: "portB",
            tx: b_tx,
            rx: b_rx,
            max_message_size,
            disconnected: false,
        };
        (a, b)
    }

    /// Port name for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether [`disconnect`](MessagePort::disconnect) has been called on this end.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl MessagePort for MemoryPort {
    fn post_message(&mut self, message: &Value) -> Result<()> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }

        let serialized = serde_json::to_string(message)?;
        if serialized.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: serialized.len(),
                max: self.max_message_size,
            });
        }

        let delivered: Value = serde_json::from_str(&serialized)?;
        self.tx
            .send(PortEvent::Message(delivered))
            .map_err(|_| TransportError::Disconnected)?;
        trace!(port = self.name, size = serialized.len(), "posted message");
        Ok(())
    }

    fn recv(&mut self) -> Result<PortEvent> {
        if self.disconnected {
            return Ok(PortEvent::Disconnected);
        }
        match self.rx.recv() {
            Ok(event) => Ok(event),
            Err(_) => Ok(PortEvent::Disconnected),
        }
    }

    fn try_recv(&mut self) -> Result<Option<PortEvent>> {
        if self.disconnected {
            return Ok(Some(PortEvent::Disconnected));
        }
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Ok(Some(PortEvent::Disconnected)),
        }
    }

    fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        let _ = self.tx.send(PortEvent::Disconnected);
        debug!(port = self.name, "port disconnected");
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(self.max_message_size)
    }
}

impl Drop for MemoryPort {
    fn drop(&mut self) {
        self.disconnect();
    }
}
