use serde_json::Value;

use crate::error::Result;

/// Something a port delivers to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    /// One whole inbound message.
    Message(Value),
    /// The remote end went away. No further messages will arrive.
    Disconnected,
}

/// A bidirectional channel of whole JSON messages with a per-message ceiling.
///
/// This is the fundamental capability the chunking layers build on. A port
/// either delivers a message whole or refuses it; it never delivers part of
/// one. Messages posted on one port arrive at its peer, though not
/// necessarily in order relative to other messages.
pub trait MessagePort {
    /// Send one message to the peer.
    ///
    /// Returns [`TransportError::MessageTooLarge`](crate::TransportError::MessageTooLarge)
    /// when the serialized message is over the port's ceiling.
    fn post_message(&mut self, message: &Value) -> Result<()>;

    /// Block until the next inbound message or disconnect.
    fn recv(&mut self) -> Result<PortEvent>;

    /// Return the next inbound event if one is already waiting.
    fn try_recv(&mut self) -> Result<Option<PortEvent>>;

    /// Close this end and notify the peer. Idempotent.
    fn disconnect(&mut self);

    /// The per-message ceiling in bytes, if the port has one.
    fn max_message_size(&self) -> Option<usize> {
        None
    }
}

impl<P: MessagePort + ?Sized> MessagePort for Box<P> {
    fn post_message(&mut self, message: &Value) -> Result<()> {
        (**self).post_message(message)
    }

    fn recv(&mut self) -> Result<PortEvent> {
        (**self).recv()
    }

    fn try_recv(&mut self) -> Result<Option<PortEvent>> {
        (**self).try_recv()
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn max_message_size(&self) -> Option<usize> {
        (**self).max_message_size()
    }
}
