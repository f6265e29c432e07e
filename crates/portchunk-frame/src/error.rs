/// Errors that can occur while framing or reassembling payloads.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The chunk size cannot hold the largest header plus one data character.
    #[error("cannot chunk messages smaller than the min chunk size, {min} (got {size})")]
    ChunkSizeTooSmall { size: usize, min: usize },

    /// A frame's header left no room for even one more character.
    #[error("frame {seq} of message {id} has no room for data within {chunk_size} bytes")]
    BudgetExhausted { id: u32, seq: u64, chunk_size: usize },

    /// The payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    /// All frames of a message arrived but their concatenation is not JSON.
    #[error("reassembled message {id} is corrupt: {source}")]
    CorruptMessage {
        id: u64,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
