//! Frame recognition for inbound messages.
//!
//! A frame is a string shaped `^\d+\|\d+\|[01].*$`, parsed strictly left to
//! right. Anything else is an ordinary message and is handed back untouched;
//! a near miss is never an error.
//!
//! Magnitudes are not checked against the 31-bit range the encoder uses. A
//! string that happens to match the grammar is indistinguishable from a real
//! frame. Digit runs too long for a `u64` cannot be represented and are
//! treated as ordinary messages.

use serde_json::Value;

/// Shortest possible frame: `0|0|1` plus one character of data.
pub const MIN_FRAME_LEN: usize = 6;

/// The parsed header of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u64,
    pub seq: u64,
    pub fin: bool,
    /// Byte offset where the frame's data begins.
    pub data_offset: usize,
}

/// An inbound frame. Owns the received text; the data is referenced by offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    header: FrameHeader,
    source: String,
}

impl InboundFrame {
    pub fn id(&self) -> u64 {
        self.header.id
    }

    pub fn seq(&self) -> u64 {
        self.header.seq
    }

    pub fn fin(&self) -> bool {
        self.header.fin
    }

    pub fn header(&self) -> FrameHeader {
        self.header
    }

    /// The frame's data (everything after the fin digit).
    pub fn data(&self) -> &str {
        &self.source[self.header.data_offset..]
    }

    /// The full received text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Split into header and the owned source text.
    pub fn into_parts(self) -> (FrameHeader, String) {
        (self.header, self.source)
    }
}

/// Parse a frame header from text.
pub fn parse_header(input: &str) -> Option<FrameHeader> {
    let bytes = input.as_bytes();
    if bytes.len() < MIN_FRAME_LEN {
        return None;
    }

    let (id, pos) = parse_field(bytes, 0)?;
    let (seq, pos) = parse_field(bytes, pos)?;
    let fin = match bytes.get(pos)? {
        b'0' => false,
        b'1' => true,
        _ => return None,
    };

    Some(FrameHeader {
        id,
        seq,
        fin,
        data_offset: pos + 1,
    })
}

/// Try to read an inbound value as a frame.
///
/// Hands the value back as `Err` when it is not a frame, so the caller can
/// deliver it as an ordinary message without cloning.
pub fn try_parse(value: Value) -> Result<InboundFrame, Value> {
    let Value::String(source) = value else {
        return Err(value);
    };
    match parse_header(&source) {
        Some(header) => Ok(InboundFrame { header, source }),
        None => Err(Value::String(source)),
    }
}

/// Parse a run of decimal digits terminated by `|`, starting at `start`.
///
/// Returns the value and the position just past the `|`.
fn parse_field(bytes: &[u8], start: usize) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut pos = start;
    loop {
        match *bytes.get(pos)? {
            digit @ b'0'..=b'9' => {
                value = value
                    .checked_mul(10)?
                    .checked_add(u64::from(digit - b'0'))?;
            }
            b'|' if pos > start => return Some((value, pos + 1)),
            _ => return None,
        }
        pos += 1;
    }
}
