use portchunk_frame::FrameError;
use portchunk_transport::TransportError;

/// Errors that can occur in stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A non-zero chunk size below the minimum was configured.
    #[error("cannot chunk messages smaller than the min chunk size, {min} (got {size})")]
    ChunkSizeTooSmall { size: usize, min: usize },

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The caller asked to write text in an encoding other than UTF-8.
    #[error("port streams only support UTF-8 encoding (got {0:?})")]
    UnsupportedEncoding(String),

    /// A single post failed and chunking did not apply.
    #[error("post failed: {0}")]
    PostFailed(#[source] TransportError),

    /// A frame of a chunked message could not be produced or sent.
    ///
    /// Frames already sent are not retracted.
    #[error("chunked post failed after {frames_sent} frame(s): {source}")]
    ChunkedPostFailed {
        frames_sent: u64,
        #[source]
        source: Box<StreamError>,
    },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error, including corrupt reassembled messages.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The stream was closed or its port disconnected.
    #[error("stream closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StreamError>;
