use std::fmt;
use std::iter::FusedIterator;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::accountant::{cut, escaped_len};
use crate::error::{FrameError, Result};
use crate::pacing::{Pacer, YieldPoint, FRAME_BUDGET};

/// Largest message id; ids wrap to 0 after it.
pub const MAX_MESSAGE_ID: u32 = 0x7fff_ffff;

/// Smallest usable chunk size.
///
/// `2147483647|2147483647|1` is 23 bytes, plus one byte of data.
pub const MIN_CHUNK_SIZE: usize = 24;

/// Default chunk size: 64 MiB, the Chromium extension message limit.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 26;

/// Produces frames for outbound payloads.
///
/// Owns the id counter for one connection. Ids only need to be unique among
/// messages in flight at the same time, so the counter simply wraps.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    last_id: u32,
    frame_budget: Duration,
}

/// Outcome of [`FrameEncoder::encode`].
#[derive(Debug)]
pub enum Encoded {
    /// Chunking is disabled; send the payload as is.
    Whole(Value),
    /// The payload's frames, produced lazily.
    Frames(Frames),
}

impl FrameEncoder {
    /// Create an encoder whose first message id is 1.
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Create an encoder whose next id follows `last_id`.
    pub fn starting_after(last_id: u32) -> Self {
        Self {
            last_id: last_id & MAX_MESSAGE_ID,
            frame_budget: FRAME_BUDGET,
        }
    }

    /// Override how long frame production may run between yields.
    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    /// Allocate the next message id.
    pub fn next_id(&mut self) -> u32 {
        self.last_id = (self.last_id + 1) & MAX_MESSAGE_ID;
        self.last_id
    }

    /// Encode a payload for a channel with the given chunk size.
    ///
    /// A chunk size of 0 disables chunking and hands the payload back
    /// untouched. Any other value must be at least [`MIN_CHUNK_SIZE`].
    pub fn encode(&mut self, payload: Value, chunk_size: usize) -> Result<Encoded> {
        if chunk_size == 0 {
            return Ok(Encoded::Whole(payload));
        }
        self.frames(&payload, chunk_size).map(Encoded::Frames)
    }

    /// Serialize `payload` and return its frames.
    ///
    /// Every call allocates a fresh message id, so re-encoding after a
    /// failed send never collides with the abandoned attempt.
    pub fn frames(&mut self, payload: &Value, chunk_size: usize) -> Result<Frames> {
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(FrameError::ChunkSizeTooSmall {
                size: chunk_size,
                min: MIN_CHUNK_SIZE,
            });
        }

        // Serialization time counts against the first frame's budget.
        let pacer = Pacer::new(self.frame_budget);
        let text: Arc<str> = serde_json::to_string(payload)
            .map_err(FrameError::Serialize)?
            .into();
        let id = self.next_id();
        debug!(id, len = text.len(), chunk_size, "chunking payload");

        Ok(Frames {
            id,
            seq: 0,
            offset: 0,
            text,
            chunk_size,
            pacer,
            done: false,
        })
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy sequence of frames for one message.
///
/// The serialized text and id are fixed when the sequence is created; it
/// cannot be restarted. Dropping it part way is always safe. Each item is a
/// `Result` because a frame whose header leaves no room for one more
/// character cannot be produced; the sequence ends after such an error.
#[derive(Debug)]
pub struct Frames {
    id: u32,
    seq: u64,
    offset: usize,
    text: Arc<str>,
    chunk_size: usize,
    pacer: Pacer,
    done: bool,
}

impl Frames {
    /// Message id shared by every frame in this sequence.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The full serialized payload.
    pub fn serialized(&self) -> &str {
        &self.text
    }

    /// Bytes of serialized text not yet emitted.
    pub fn remaining(&self) -> usize {
        self.text.len() - self.offset
    }

    /// Whether the final frame has been produced (or production failed).
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Produce the next frame, first yielding through `point` if this
    /// sequence has used up its time budget.
    pub fn next_paced<Y: YieldPoint + ?Sized>(
        &mut self,
        point: &mut Y,
    ) -> Option<Result<OutboundFrame>> {
        if !self.done && self.pacer.maybe_yield(point) {
            trace!(id = self.id, seq = self.seq, "yielded between frames");
        }
        self.next()
    }

    /// Produce the next frame, first suspending the current tokio task if
    /// this sequence has used up its time budget.
    #[cfg(feature = "async")]
    pub async fn next_async(&mut self) -> Option<Result<OutboundFrame>> {
        if !self.done && self.pacer.maybe_yield_async().await {
            trace!(id = self.id, seq = self.seq, "yielded between frames");
        }
        self.next()
    }

    fn produce(&mut self) -> Result<OutboundFrame> {
        let header_len = decimal_len(u64::from(self.id)) + decimal_len(self.seq) + 2;
        let exhausted = FrameError::BudgetExhausted {
            id: self.id,
            seq: self.seq,
            chunk_size: self.chunk_size,
        };

        let data_max = match self.chunk_size.checked_sub(header_len + 1) {
            Some(n) if n > 0 => n,
            _ => return Err(exhausted),
        };

        let end = cut(&self.text, self.offset, data_max);
        if end == self.offset {
            return Err(exhausted);
        }

        let fin = end == self.text.len();
        let frame = OutboundFrame {
            id: self.id,
            seq: self.seq,
            fin,
            source: Arc::clone(&self.text),
            range: self.offset..end,
        };

        self.offset = end;
        self.seq += 1;
        self.done = fin;
        Ok(frame)
    }
}

impl Iterator for Frames {
    type Item = Result<OutboundFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let frame = self.produce();
        if frame.is_err() {
            self.done = true;
        }
        Some(frame)
    }
}

impl FusedIterator for Frames {}

/// One outbound frame: a header plus a view into the serialized payload.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    id: u32,
    seq: u64,
    fin: bool,
    source: Arc<str>,
    range: Range<usize>,
}

impl OutboundFrame {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// True on the last frame of a message.
    pub fn fin(&self) -> bool {
        self.fin
    }

    /// This frame's slice of the serialized payload.
    pub fn data(&self) -> &str {
        &self.source[self.range.clone()]
    }

    /// Byte range of [`data`](Self::data) within the serialized payload.
    pub fn data_range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// The frame's wire text, `{id}|{seq}|{fin}{data}`.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// The frame as a message ready for a port.
    pub fn into_value(self) -> Value {
        Value::String(self.to_wire())
    }

    /// Bytes this frame occupies once serialized as a JSON string.
    pub fn wire_size(&self) -> usize {
        decimal_len(u64::from(self.id)) + decimal_len(self.seq) + 3 + escaped_len(self.data())
    }
}

impl fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}{}",
            self.id,
            self.seq,
            u8::from(self.fin),
            self.data()
        )
    }
}

fn decimal_len(mut n: u64) -> usize {
    let mut len = 1;
    while n >= 10 {
        n /= 10;
        len += 1;
    }
    len
}
