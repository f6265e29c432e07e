//! Transparent chunking of JSON messages over size-limited message ports.
//!
//! A message port delivers whole JSON values but refuses anything above a
//! size ceiling. portchunk splits oversized values into small text frames,
//! sends them over the same port, and rebuilds them on the other side.
//!
//! # Crate Structure
//!
//! - [`transport`]: the `MessagePort` capability plus in-memory and Unix
//!   datagram ports
//! - [`frame`]: byte accounting, frame encoding, frame parsing and reassembly
//! - [`stream`]: `PortStream`, which chunks on write and reassembles on read

/// Re-export transport types.
pub mod transport {
    pub use portchunk_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use portchunk_frame::*;
}

/// Re-export stream types.
pub mod stream {
    pub use portchunk_stream::*;
}
