use portchunk_transport::TransportError;
use serde_json::Value;

/// Which way a logged message was travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Raised once when a message is too large for one post, before any of its
/// frames are sent.
#[derive(Debug)]
pub struct MessageTooLarge<'a> {
    /// The message that did not fit.
    pub message: &'a Value,
    /// The chunk size that will be used (0 if chunking is disabled).
    pub chunk_size: usize,
    /// The port's original refusal.
    pub original_error: &'a TransportError,
}

pub(crate) type LogHook = Box<dyn FnMut(&Value, Direction) + Send>;

pub(crate) type TooLargeObserver = Box<dyn FnMut(&MessageTooLarge<'_>) + Send>;
