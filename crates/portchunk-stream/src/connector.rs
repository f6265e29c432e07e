use std::path::Path;

use portchunk_transport::datagram::DEFAULT_MAX_DATAGRAM;
use portchunk_transport::DatagramPort;

use crate::config::StreamConfig;
use crate::error::Result;
use crate::stream::PortStream;

/// Open a sending stream to a datagram socket bound at `path`.
pub fn connect(path: impl AsRef<Path>) -> Result<PortStream<DatagramPort>> {
    connect_with_config(path, StreamConfig::default(), DEFAULT_MAX_DATAGRAM)
}

/// Connect with explicit configuration and datagram ceiling.
pub fn connect_with_config(
    path: impl AsRef<Path>,
    config: StreamConfig,
    max_datagram: usize,
) -> Result<PortStream<DatagramPort>> {
    let port = DatagramPort::connect(path, max_datagram)?;
    PortStream::with_config(port, config)
}

/// Bind a receiving stream at `path`.
pub fn bind(path: impl AsRef<Path>) -> Result<PortStream<DatagramPort>> {
    bind_with_config(path, StreamConfig::default(), DEFAULT_MAX_DATAGRAM)
}

/// Bind with explicit configuration and datagram ceiling.
pub fn bind_with_config(
    path: impl AsRef<Path>,
    config: StreamConfig,
    max_datagram: usize,
) -> Result<PortStream<DatagramPort>> {
    let port = DatagramPort::bind(path, max_datagram)?;
    PortStream::with_config(port, config)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::StreamError;

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("portchunk-{}-{name}.sock", std::process::id()))
    }

    #[test]
    fn chunked_roundtrip_over_socket() {
        let path = socket_path("roundtrip");
        let mut server = bind_with_config(&path, StreamConfig::default(), 1024).unwrap();
        let mut client = connect_with_config(&path, StreamConfig::default(), 1024).unwrap();
        assert_eq!(client.chunk_size(), 1024);

        let message = json!({"blob": "b".repeat(4000), "tail": [1, 2, 3]});
        let sent = message.clone();
        let writer = thread::spawn(move || {
            client.write(&sent).unwrap();
            client.write(&json!("small")).unwrap();
        });

        assert_eq!(server.read().unwrap(), Some(message));
        assert_eq!(server.read().unwrap(), Some(json!("small")));
        writer.join().unwrap();
        assert_eq!(server.read().unwrap(), None);
    }

    #[test]
    fn connect_to_missing_socket_fails() {
        let path = socket_path("missing");
        let _ = std::fs::remove_file(&path);
        let err = connect(&path).unwrap_err();
        assert!(matches!(err, StreamError::Transport(_)));
    }
}
