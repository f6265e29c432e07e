use std::path::PathBuf;

/// Errors that can occur in message port operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The message exceeds the port's per-message ceiling.
    #[error("message length exceeded maximum allowed length ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The port (or its peer) has been disconnected.
    #[error("port disconnected")]
    Disconnected,

    /// The message could not be serialized or an inbound datagram was not JSON.
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the underlying socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// True when the port refused the message because of its size.
    ///
    /// This is the only error that triggers fallback chunking.
    pub fn is_message_too_large(&self) -> bool {
        matches!(self, TransportError::MessageTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_size_errors_are_too_large() {
        assert!(TransportError::MessageTooLarge { size: 10, max: 5 }.is_message_too_large());
        assert!(!TransportError::Disconnected.is_message_too_large());
        assert!(!TransportError::Io(std::io::Error::other("boom")).is_message_too_large());
    }

    #[test]
    fn too_large_message_mentions_sizes() {
        let err = TransportError::MessageTooLarge { size: 129, max: 128 };
        let text = err.to_string();
        assert!(text.contains("129"));
        assert!(text.contains("128"));
    }
}
