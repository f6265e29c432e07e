use std::io::ErrorKind;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{MessagePort, PortEvent};

/// Default per-datagram ceiling: 64 KiB.
pub const DEFAULT_MAX_DATAGRAM: usize = 64 * 1024;

/// Message port over Unix datagram sockets.
///
/// Every message is one datagram carrying compact JSON. A zero-length
/// datagram is never valid JSON and is used as the disconnect notice.
///
/// Two shapes are supported:
/// - [`DatagramPort::pair`] for a connected in-process pair
/// - [`DatagramPort::bind`] / [`DatagramPort::connect`] for a receiving end
///   at a filesystem path and a sending end that targets it
pub struct DatagramPort {
    socket: UnixDatagram,
    max_message_size: usize,
    buf: BytesMut,
    path: Option<PathBuf>,
    created_inode: Option<(u64, u64)>,
    disconnected: bool,
}

impl DatagramPort {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Create a connected pair of datagram ports.
    pub fn pair() -> Result<(Self, Self)> {
        Self::pair_with_limit(DEFAULT_MAX_DATAGRAM)
    }

    /// Create a connected pair with an explicit per-message ceiling.
    pub fn pair_with_limit(max_message_size: usize) -> Result<(Self, Self)> {
        let (a, b) = UnixDatagram::pair()?;
        Ok((
            Self::from_socket(a, max_message_size),
            Self::from_socket(b, max_message_size),
        ))
    }

    /// Bind a receiving port at `path`.
    ///
    /// A stale socket file at `path` is removed first; any other kind of
    /// file is left alone and reported as a bind error.
    pub fn bind(path: impl AsRef<Path>, max_message_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| TransportError::Bind { path, source }
        };

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(bind_err(&path))?;
            if !metadata.file_type().is_socket() {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err(&path))?;
        }

        let socket = UnixDatagram::bind(&path).map_err(bind_err(&path))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::DEFAULT_SOCKET_MODE))
            .map_err(bind_err(&path))?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err(&path))?;

        info!(?path, max_message_size, "listening on unix datagram socket");

        let mut port = Self::from_socket(socket, max_message_size);
        port.created_inode = Some((created.dev(), created.ino()));
        port.path = Some(path);
        Ok(port)
    }

    /// Create a sending port targeting a socket bound at `path`.
    pub fn connect(path: impl AsRef<Path>, max_message_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let socket = UnixDatagram::unbound()?;
        socket
            .connect(path)
            .map_err(|source| TransportError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(?path, "connected to unix datagram socket");
        Ok(Self::from_socket(socket, max_message_size))
    }

    fn from_socket(socket: UnixDatagram, max_message_size: usize) -> Self {
        raise_socket_buffers(&socket, max_message_size);
        Self {
            socket,
            max_message_size,
            // One spare byte lets an oversized inbound datagram be detected
            // instead of silently truncated to a valid length.
            buf: BytesMut::zeroed(max_message_size.saturating_add(1)),
            path: None,
            created_inode: None,
            disconnected: false,
        }
    }

    /// The path this port is bound to, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn decode(&self, len: usize) -> Result<PortEvent> {
        if len == 0 {
            return Ok(PortEvent::Disconnected);
        }
        if len > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: len,
                max: self.max_message_size,
            });
        }
        let value = serde_json::from_slice(&self.buf[..len])?;
        Ok(PortEvent::Message(value))
    }
}

/// Make sure one datagram of `max_message_size` bytes fits the socket buffers.
///
/// The kernel caps a Unix datagram at the send buffer size, which defaults
/// to 2 KiB on macOS. Buffers already large enough are left alone; failures
/// are logged and the port keeps the kernel's sizes.
fn raise_socket_buffers(socket: &UnixDatagram, max_message_size: usize) {
    let wanted =
        libc::c_int::try_from(max_message_size.saturating_add(1)).unwrap_or(libc::c_int::MAX);
    let fd = socket.as_raw_fd();
    for (option, name) in [(libc::SO_SNDBUF, "SO_SNDBUF"), (libc::SO_RCVBUF, "SO_RCVBUF")] {
        let raised = socket_buffer_size(fd, option).and_then(|current| {
            if current >= wanted {
                return Ok(());
            }
            set_socket_buffer_size(fd, option, wanted)
        });
        if let Err(err) = raised {
            warn!(option = name, wanted, error = %err, "could not size datagram socket buffer");
        }
    }
}

fn socket_buffer_size(fd: RawFd, option: libc::c_int) -> std::io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: `value` and `len` are live locals sized for a c_int option.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &mut value as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(value)
}

fn set_socket_buffer_size(
    fd: RawFd,
    option: libc::c_int,
    value: libc::c_int,
) -> std::io::Result<()> {
    // SAFETY: `value` is a live c_int and the length matches it.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            option,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

impl MessagePort for DatagramPort {
    fn post_message(&mut self, message: &Value) -> Result<()> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }

        let bytes = serde_json::to_vec(message)?;
        if bytes.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: bytes.len(),
                max: self.max_message_size,
            });
        }

        match self.socket.send(&bytes) {
            Ok(_) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::EMSGSIZE) => {
                Err(TransportError::MessageTooLarge {
                    size: bytes.len(),
                    max: self.max_message_size,
                })
            }
            Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                Err(TransportError::Disconnected)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn recv(&mut self) -> Result<PortEvent> {
        if self.disconnected {
            return Ok(PortEvent::Disconnected);
        }
        self.socket.set_nonblocking(false)?;
        let len = loop {
            match self.socket.recv(&mut self.buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        };
        self.decode(len)
    }

    fn try_recv(&mut self) -> Result<Option<PortEvent>> {
        if self.disconnected {
            return Ok(Some(PortEvent::Disconnected));
        }
        self.socket.set_nonblocking(true)?;
        let received = self.socket.recv(&mut self.buf);
        self.socket.set_nonblocking(false)?;
        match received {
            Ok(n) => self.decode(n).map(Some),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;
        // Receive-only ports have no peer address; the notice is best-effort.
        let _ = self.socket.send(&[]);
        debug!(path = ?self.path, "datagram port disconnected");
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(self.max_message_size)
    }
}

impl Drop for DatagramPort {
    fn drop(&mut self) {
        self.disconnect();

        let (Some(path), Some((expected_dev, expected_ino))) = (&self.path, self.created_inode)
        else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(?path, "cleaning up socket file");
                let _ = std::fs::remove_file(path);
            } else {
                debug!(?path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

impl std::fmt::Debug for DatagramPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramPort")
            .field("path", &self.path)
            .field("max_message_size", &self.max_message_size)
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("portchunk-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn pair_roundtrip() {
        let (mut a, mut b) = DatagramPort::pair().unwrap();
        a.post_message(&json!({"k": [1, 2, 3]})).unwrap();
        assert_eq!(b.recv().unwrap(), PortEvent::Message(json!({"k": [1, 2, 3]})));
    }

    #[test]
    fn refuses_messages_over_ceiling() {
        let (mut a, mut b) = DatagramPort::pair_with_limit(16).unwrap();
        let err = a.post_message(&json!("x".repeat(64))).unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { size: 66, max: 16 }));
        assert!(b.try_recv().unwrap().is_none());
    }

    #[test]
    fn socket_buffers_hold_one_full_datagram() {
        let (a, b) = DatagramPort::pair().unwrap();
        let wanted = DEFAULT_MAX_DATAGRAM as libc::c_int + 1;
        for port in [&a, &b] {
            let fd = port.socket.as_raw_fd();
            assert!(socket_buffer_size(fd, libc::SO_SNDBUF).unwrap() >= wanted);
            assert!(socket_buffer_size(fd, libc::SO_RCVBUF).unwrap() >= wanted);
        }
    }

    #[test]
    fn near_ceiling_datagram_is_delivered() {
        let (mut a, mut b) = DatagramPort::pair().unwrap();
        let message = json!("d".repeat(DEFAULT_MAX_DATAGRAM - 2));
        a.post_message(&message).unwrap();
        assert_eq!(b.recv().unwrap(), PortEvent::Message(message));
    }

    #[test]
    fn zero_length_datagram_is_disconnect() {
        let (mut a, mut b) = DatagramPort::pair().unwrap();
        a.disconnect();
        assert_eq!(b.recv().unwrap(), PortEvent::Disconnected);
        assert!(matches!(
            a.post_message(&json!(1)),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn bind_connect_and_cleanup() {
        let dir = temp_dir("dgram-bind");
        let sock_path = dir.join("test.sock");

        let mut server = DatagramPort::bind(&sock_path, DEFAULT_MAX_DATAGRAM).unwrap();
        assert!(sock_path.exists());
        assert_eq!(server.path(), Some(sock_path.as_path()));

        let mut client = DatagramPort::connect(&sock_path, DEFAULT_MAX_DATAGRAM).unwrap();
        client.post_message(&json!("hello")).unwrap();
        assert_eq!(server.recv().unwrap(), PortEvent::Message(json!("hello")));

        drop(client);
        assert_eq!(server.recv().unwrap(), PortEvent::Disconnected);

        drop(server);
        assert!(!sock_path.exists(), "socket file should be cleaned up on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("dgram-file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = DatagramPort::bind(&sock_path, DEFAULT_MAX_DATAGRAM);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bind_rejects_long_paths() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = DatagramPort::bind(&long_path, DEFAULT_MAX_DATAGRAM);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn connect_to_missing_path_fails() {
        let dir = temp_dir("dgram-missing");
        let result = DatagramPort::connect(dir.join("nobody.sock"), DEFAULT_MAX_DATAGRAM);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn non_json_datagram_is_an_error() {
        let (raw_a, raw_b) = UnixDatagram::pair().unwrap();
        let mut port = DatagramPort::from_socket(raw_b, DEFAULT_MAX_DATAGRAM);
        raw_a.send(b"not json").unwrap();
        assert!(matches!(port.recv(), Err(TransportError::Json(_))));
    }
}
