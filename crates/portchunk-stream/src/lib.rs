//! Message port streams with transparent chunking.
//!
//! This is the "just works" layer. Wrap any [`MessagePort`] in a
//! [`PortStream`], write JSON values of any size, and read them back on the
//! other side. Values that fit go out as they are; values the port refuses
//! for size are split into frames and rebuilt by the receiving stream.
//!
//! [`MessagePort`]: portchunk_transport::MessagePort

pub mod config;
#[cfg(unix)]
pub mod connector;
pub mod error;
pub mod events;
pub mod stream;

pub use config::{StreamConfig, CHUNK_SIZE_ENV};
#[cfg(unix)]
pub use connector::{bind, bind_with_config, connect, connect_with_config};
pub use error::{Result, StreamError};
pub use events::{Direction, MessageTooLarge};
pub use stream::PortStream;
