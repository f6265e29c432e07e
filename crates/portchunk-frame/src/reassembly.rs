use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FrameError, Result};
use crate::grammar::InboundFrame;

/// One received part: the frame text and where its data begins.
#[derive(Debug)]
struct Part {
    source: String,
    data_offset: usize,
}

impl Part {
    fn data(&self) -> &str {
        &self.source[self.data_offset..]
    }
}

/// Partial state for one message id.
#[derive(Debug, Default)]
struct InFlight {
    parts: BTreeMap<u64, Part>,
    /// Known once the fin frame arrives: its seq + 1.
    expected: Option<u64>,
}

impl InFlight {
    fn is_complete(&self) -> bool {
        let Some(expected) = self.expected else {
            return false;
        };
        // Keys are distinct and ordered, so `len == expected` plus a last key
        // of `expected - 1` means exactly 0..expected are present.
        self.parts.len() as u64 == expected
            && self.parts.keys().next_back() == Some(&(expected - 1))
    }
}

/// Rebuilds chunked messages on the receiving side of one connection.
///
/// Frames of different ids may interleave freely and frames of one id may
/// arrive in any order. An entry lives from its first frame until it
/// completes or the table is cleared; entries whose fin frame never arrives
/// are not evicted.
#[derive(Debug, Default)]
pub struct ReassemblyTable {
    in_flight: HashMap<u64, InFlight>,
}

impl ReassemblyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame. Returns the rebuilt payload once its message is complete.
    ///
    /// A completed message whose concatenated data is not valid JSON yields
    /// [`FrameError::CorruptMessage`]. Its entry is gone either way; other
    /// messages are unaffected.
    pub fn on_frame(&mut self, frame: InboundFrame) -> Result<Option<Value>> {
        let (header, source) = frame.into_parts();
        let entry = self.in_flight.entry(header.id).or_default();

        if header.fin {
            entry.expected = Some(header.seq.saturating_add(1));
        }
        entry.parts.insert(
            header.seq,
            Part {
                source,
                data_offset: header.data_offset,
            },
        );

        if !entry.is_complete() {
            return Ok(None);
        }

        let Some(entry) = self.in_flight.remove(&header.id) else {
            return Ok(None);
        };
        let raw = join_parts(&entry.parts);
        debug!(
            id = header.id,
            parts = entry.parts.len(),
            len = raw.len(),
            "reassembled message"
        );

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                warn!(id = header.id, error = %source, "reassembled message is not valid JSON");
                Err(FrameError::CorruptMessage {
                    id: header.id,
                    source,
                })
            }
        }
    }

    /// Drop every partial message. Used on connection teardown.
    pub fn clear(&mut self) {
        if !self.in_flight.is_empty() {
            warn!(dropped = self.in_flight.len(), "discarding partial messages");
        }
        self.in_flight.clear();
    }

    /// Number of messages with at least one frame received.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Whether a partial message with this id is buffered.
    pub fn contains(&self, id: u64) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Ids of buffered partial messages, in ascending order.
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.in_flight.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Concatenate part data in seq order with a single allocation.
fn join_parts(parts: &BTreeMap<u64, Part>) -> String {
    let capacity = parts.values().map(|part| part.data().len()).sum();
    let mut raw = String::with_capacity(capacity);
    for part in parts.values() {
        raw.push_str(part.data());
    }
    raw
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::encoder::FrameEncoder;
    use crate::grammar::try_parse;

    fn frame(text: &str) -> InboundFrame {
        try_parse(json!(text)).expect("test input must be a frame")
    }

    fn encode(encoder: &mut FrameEncoder, payload: &Value, chunk_size: usize) -> Vec<InboundFrame> {
        encoder
            .frames(payload, chunk_size)
            .unwrap()
            .map(|f| try_parse(f.unwrap().into_value()).unwrap())
            .collect()
    }

    #[test]
    fn single_frame_completes_immediately() {
        let mut table = ReassemblyTable::new();
        let value = table.on_frame(frame("0|0|1\"data\"")).unwrap();
        assert_eq!(value, Some(json!("data")));
        assert!(table.is_empty());
    }

    #[test]
    fn in_order_parts() {
        let mut table = ReassemblyTable::new();
        assert_eq!(table.on_frame(frame("5|0|0{\"a\":")).unwrap(), None);
        assert_eq!(table.on_frame(frame("5|1|0[1,2,")).unwrap(), None);
        assert!(table.contains(5));
        assert_eq!(
            table.on_frame(frame("5|2|13]}")).unwrap(),
            Some(json!({"a": [1, 2, 3]}))
        );
        assert!(!table.contains(5));
    }

    #[test]
    fn out_of_order_parts() {
        let mut encoder = FrameEncoder::new();
        let payload = json!({"text": "chunk me ".repeat(20), "n": [1, 2, 3]});
        let mut frames = encode(&mut encoder, &payload, 40);
        assert!(frames.len() > 3);
        frames.reverse();

        let mut table = ReassemblyTable::new();
        let last = frames.pop().unwrap();
        for f in frames {
            assert_eq!(table.on_frame(f).unwrap(), None);
        }
        assert_eq!(table.on_frame(last).unwrap(), Some(payload));
        assert!(table.is_empty());
    }

    #[test]
    fn fin_first_waits_for_missing_parts() {
        let mut table = ReassemblyTable::new();
        assert_eq!(table.on_frame(frame("9|1|1\"")).unwrap(), None);
        assert_eq!(table.on_frame(frame("9|0|0\"ab")).unwrap(), Some(json!("ab")));
    }

    #[test]
    fn stray_high_seq_does_not_complete_early() {
        let mut table = ReassemblyTable::new();
        // Two parts, fin says two, but seq 0 is missing.
        assert_eq!(table.on_frame(frame("3|7|0xx")).unwrap(), None);
        assert_eq!(table.on_frame(frame("3|1|1\"")).unwrap(), None);
        assert!(table.contains(3));
    }

    #[test]
    fn duplicate_seq_overwrites() {
        let mut table = ReassemblyTable::new();
        assert_eq!(table.on_frame(frame("4|0|0\"zz")).unwrap(), None);
        assert_eq!(table.on_frame(frame("4|0|0\"ab")).unwrap(), None);
        assert_eq!(table.on_frame(frame("4|1|1c\"")).unwrap(), Some(json!("abc")));
    }

    #[test]
    fn interleaved_ids_do_not_mix() {
        let mut encoder = FrameEncoder::new();
        let first = json!({"who": "first", "body": "1".repeat(120)});
        let second = json!(["second", "2".repeat(90), {"deep": true}]);
        let a = encode(&mut encoder, &first, 32);
        let b = encode(&mut encoder, &second, 32);
        assert_ne!(a[0].id(), b[0].id());

        let mut table = ReassemblyTable::new();
        let mut delivered = Vec::new();
        let mut a = a.into_iter();
        let mut b = b.into_iter();
        loop {
            let next_a = a.next();
            let next_b = b.next();
            if next_a.is_none() && next_b.is_none() {
                break;
            }
            for f in next_a.into_iter().chain(next_b) {
                if let Some(value) = table.on_frame(f).unwrap() {
                    delivered.push(value);
                }
            }
        }

        assert_eq!(delivered.len(), 2);
        assert!(delivered.contains(&first));
        assert!(delivered.contains(&second));
        assert!(table.is_empty());
    }

    #[test]
    fn corrupt_message_is_reported_and_removed() {
        let mut table = ReassemblyTable::new();
        table.on_frame(frame("8|0|0{\"a\":")).unwrap();
        table.on_frame(frame("1|0|0\"ok")).unwrap();

        let err = table.on_frame(frame("8|1|1oops")).unwrap_err();
        assert!(matches!(err, FrameError::CorruptMessage { id: 8, .. }));
        assert!(!table.contains(8));

        assert_eq!(table.on_frame(frame("1|1|1\"")).unwrap(), Some(json!("ok")));
    }

    #[test]
    fn clear_discards_partials_and_late_frames_start_fresh() {
        let mut table = ReassemblyTable::new();
        table.on_frame(frame("2|0|0\"hel")).unwrap();
        table.on_frame(frame("6|0|0[1,")).unwrap();
        assert_eq!(table.pending_ids(), vec![2, 6]);

        table.clear();
        assert!(table.is_empty());

        // The late fin alone cannot complete: seq 0 was discarded.
        assert_eq!(table.on_frame(frame("2|1|1lo\"")).unwrap(), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.on_frame(frame("2|0|0\"hel")).unwrap(), Some(json!("hello")));
    }

    #[test]
    fn join_parts_concatenates_in_seq_order() {
        let mut parts = BTreeMap::new();
        parts.insert(
            1,
            Part {
                source: "1|1|0world".to_string(),
                data_offset: 5,
            },
        );
        parts.insert(
            0,
            Part {
                source: "1|0|0hello ".to_string(),
                data_offset: 5,
            },
        );
        assert_eq!(join_parts(&parts), "hello world");
    }

    #[test]
    fn floats_survive_reassembly_exactly() {
        let payload = json!({
            "x": 4036.1428571428573f64,
            "series": [0.1, 1e-7, 123456.78901234567, -2.2250738585072014e-308, 1.7976931348623157e308],
        });
        for chunk_size in [24, 37, 64] {
            let mut encoder = FrameEncoder::new();
            let mut table = ReassemblyTable::new();
            let mut result = None;
            for f in encode(&mut encoder, &payload, chunk_size) {
                result = table.on_frame(f).unwrap();
            }
            assert_eq!(result.as_ref(), Some(&payload), "chunk size {chunk_size}");
        }
    }

    #[test]
    fn roundtrip_through_table_for_many_chunk_sizes() {
        let payload = json!({
            "emoji": "😀".repeat(30),
            "escapes": "quote \" backslash \\ newline \n",
            "mixed": ["ünï", "✓", 1.5, null, {"k": false}],
        });
        for chunk_size in 24..=96 {
            let mut encoder = FrameEncoder::starting_after(chunk_size as u32 * 1000);
            let mut table = ReassemblyTable::new();
            let mut result = None;
            for f in encode(&mut encoder, &payload, chunk_size) {
                assert!(result.is_none(), "delivered before the last frame");
                result = table.on_frame(f).unwrap();
            }
            assert_eq!(result.as_ref(), Some(&payload), "chunk size {chunk_size}");
        }
    }
}
