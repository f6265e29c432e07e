//! Byte-budgeted framing of JSON payloads for size-limited message channels.
//!
//! This is the core value-add layer of portchunk. A payload too large for one
//! message is serialized once and cut into text frames of the form
//!
//! ```text
//! {id}|{seq}|{fin}{data}
//! ```
//!
//! where each frame, serialized as a JSON string, stays within the chunk
//! size and never splits a character. The receiving side recognizes frames,
//! buffers them per `id`, and rebuilds the payload once every `seq` arrived.
//!
//! - [`accountant`]: escaped byte accounting and cut points
//! - [`encoder`]: lazy frame production with cooperative pacing
//! - [`grammar`]: frame recognition for inbound values
//! - [`reassembly`]: per-connection reassembly table

pub mod accountant;
pub mod encoder;
pub mod error;
pub mod grammar;
pub mod pacing;
pub mod reassembly;

pub use accountant::{cut, escaped_char_len, escaped_len, QUOTE_OVERHEAD};
pub use encoder::{
    Encoded, FrameEncoder, Frames, OutboundFrame, DEFAULT_CHUNK_SIZE, MAX_MESSAGE_ID,
    MIN_CHUNK_SIZE,
};
pub use error::{FrameError, Result};
pub use grammar::{parse_header, try_parse, FrameHeader, InboundFrame, MIN_FRAME_LEN};
pub use pacing::{NoYield, Pacer, SleepYield, ThreadYield, YieldPoint, FRAME_BUDGET};
pub use reassembly::ReassemblyTable;
