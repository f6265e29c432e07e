//! Message port abstraction for portchunk.
//!
//! A message port moves whole JSON values between two endpoints and refuses
//! any single message larger than its ceiling. Implementations:
//! - [`MemoryPort`]: an in-process pair, measured the way a browser
//!   extension port measures (`serde_json` bytes)
//! - [`DatagramPort`]: Unix datagram sockets (Linux/macOS)
//!
//! This is the lowest layer of portchunk. The chunking layers only ever see
//! the [`MessagePort`] trait.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod datagram;

pub use error::{Result, TransportError};
pub use memory::MemoryPort;
pub use traits::{MessagePort, PortEvent};

#[cfg(unix)]
pub use datagram::DatagramPort;
