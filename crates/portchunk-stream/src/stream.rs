use portchunk_frame::{
    try_parse, FrameEncoder, Frames, OutboundFrame, ReassemblyTable, ThreadYield, YieldPoint,
};
use portchunk_transport::{MessagePort, PortEvent, TransportError};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::events::{Direction, LogHook, MessageTooLarge, TooLargeObserver};

/// A duplex stream of JSON values over a [`MessagePort`].
///
/// Writes try a single post first. When the port refuses the value for size
/// and chunking is enabled, the value is split into frames sent in order;
/// the receiving `PortStream` rebuilds it before handing it out. Values that
/// fit are never framed, and values received from a peer that does not
/// chunk pass straight through.
pub struct PortStream<P> {
    port: P,
    config: StreamConfig,
    encoder: FrameEncoder,
    table: ReassemblyTable,
    yield_point: Box<dyn YieldPoint + Send>,
    log: Option<LogHook>,
    too_large: Vec<TooLargeObserver>,
    closed: bool,
}

impl<P: MessagePort> PortStream<P> {
    /// Wrap `port` with the default configuration.
    pub fn new(port: P) -> Result<Self> {
        Self::with_config(port, StreamConfig::default())
    }

    /// Wrap `port` with an explicit configuration.
    ///
    /// A chunk size above the port's own ceiling is lowered to it, since
    /// frames that large could never be posted.
    pub fn with_config(port: P, mut config: StreamConfig) -> Result<Self> {
        if let Some(max) = port.max_message_size() {
            if config.chunk_size > max {
                debug!(
                    requested = config.chunk_size,
                    max, "lowering chunk size to port ceiling"
                );
                config.chunk_size = max;
            }
        }
        config.validate()?;

        Ok(Self {
            port,
            encoder: FrameEncoder::new().with_frame_budget(config.frame_budget),
            config,
            table: ReassemblyTable::new(),
            yield_point: Box::new(ThreadYield),
            log: None,
            too_large: Vec::new(),
            closed: false,
        })
    }

    /// Replace how chunking yields once its time budget is spent.
    pub fn with_yield_point(mut self, point: impl YieldPoint + Send + 'static) -> Self {
        self.yield_point = Box::new(point);
        self
    }

    /// The effective chunk size. `0` means chunking is disabled.
    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Install a hook that sees every whole value written or delivered.
    ///
    /// Frames are not logged; a chunked value is logged once, after its
    /// last frame is sent or once it is rebuilt.
    pub fn set_logger(&mut self, log: impl FnMut(&Value, Direction) + Send + 'static) {
        self.log = Some(Box::new(log));
    }

    /// Register an observer for values the port refuses as too large.
    ///
    /// Observers run once per refused value, before any frame is sent, and
    /// also when chunking is disabled.
    pub fn on_message_too_large(
        &mut self,
        observer: impl FnMut(&MessageTooLarge<'_>) + Send + 'static,
    ) {
        self.too_large.push(Box::new(observer));
    }

    /// Send one value, chunking it if the port refuses it for size.
    ///
    /// Blocks the calling thread for the whole send; pacing between frames
    /// goes through the configured [`YieldPoint`]. When a chunked send fails
    /// partway, frames already sent stay sent and the receiver keeps a
    /// partial entry until teardown.
    pub fn write(&mut self, message: &Value) -> Result<()> {
        if self.try_single_post(message)? {
            return Ok(());
        }

        let mut frames = self.start_frames(message)?;
        let mut sent = 0u64;
        while let Some(frame) = frames.next_paced(&mut self.yield_point) {
            self.post_frame(frame, &mut sent)?;
        }
        debug!(id = frames.id(), frames = sent, "sent chunked message");

        self.emit_log(message, Direction::Outgoing);
        Ok(())
    }

    /// Like [`write`](Self::write), but suspends the current tokio task
    /// between frames once the frame budget is spent.
    ///
    /// Each post to the port is still a synchronous call.
    #[cfg(feature = "async")]
    pub async fn write_async(&mut self, message: &Value) -> Result<()> {
        if self.try_single_post(message)? {
            return Ok(());
        }

        let mut frames = self.start_frames(message)?;
        let mut sent = 0u64;
        while let Some(frame) = frames.next_async().await {
            self.post_frame(frame, &mut sent)?;
        }
        debug!(id = frames.id(), frames = sent, "sent chunked message");

        self.emit_log(message, Direction::Outgoing);
        Ok(())
    }

    /// Like [`write`](Self::write), for callers that pass a text encoding
    /// alongside the value. Only UTF-8 is accepted.
    pub fn write_encoded(&mut self, message: &Value, encoding: &str) -> Result<()> {
        if !is_utf8_label(encoding) {
            return Err(StreamError::UnsupportedEncoding(encoding.to_string()));
        }
        self.write(message)
    }

    /// Block until the next whole value arrives.
    ///
    /// Returns `Ok(None)` once the port disconnects; partial messages are
    /// discarded at that point.
    pub fn read(&mut self) -> Result<Option<Value>> {
        while !self.closed {
            match self.port.recv()? {
                PortEvent::Message(message) => {
                    if let Some(value) = self.handle_message(message)? {
                        return Ok(Some(value));
                    }
                }
                PortEvent::Disconnected => self.handle_disconnect(),
            }
        }
        Ok(None)
    }

    /// Process whatever the port has ready without blocking.
    ///
    /// Returns the first whole value that becomes available, or `Ok(None)`
    /// when the port has nothing more right now or is disconnected.
    pub fn try_read(&mut self) -> Result<Option<Value>> {
        while !self.closed {
            match self.port.try_recv()? {
                Some(PortEvent::Message(message)) => {
                    if let Some(value) = self.handle_message(message)? {
                        return Ok(Some(value));
                    }
                }
                Some(PortEvent::Disconnected) => self.handle_disconnect(),
                None => break,
            }
        }
        Ok(None)
    }

    /// Feed one received message through framing.
    ///
    /// Frames are buffered until their message completes; anything else is
    /// returned as-is. With chunking disabled, nothing is treated as a frame.
    pub fn handle_message(&mut self, message: Value) -> Result<Option<Value>> {
        let message = if self.config.chunking_enabled() {
            match try_parse(message) {
                Ok(frame) => {
                    debug!(
                        id = frame.id(),
                        seq = frame.seq(),
                        fin = frame.fin(),
                        "received frame"
                    );
                    let rebuilt = self.table.on_frame(frame)?;
                    if let Some(value) = &rebuilt {
                        self.emit_log(value, Direction::Incoming);
                    }
                    return Ok(rebuilt);
                }
                Err(plain) => plain,
            }
        } else {
            message
        };

        self.emit_log(&message, Direction::Incoming);
        Ok(Some(message))
    }

    /// Tear down after the port disconnects: partial messages are dropped.
    pub fn handle_disconnect(&mut self) {
        if !self.closed {
            debug!(pending = self.table.len(), "port disconnected");
        }
        self.table.clear();
        self.closed = true;
    }

    /// Disconnect the port and discard partial messages.
    pub fn close(&mut self) {
        self.port.disconnect();
        self.handle_disconnect();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of messages with frames received but not yet complete.
    pub fn pending_messages(&self) -> usize {
        self.table.len()
    }

    pub fn get_ref(&self) -> &P {
        &self.port
    }

    pub fn get_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Post `message` as is. Returns `Ok(false)` when the port refused it
    /// for size and it must be chunked; the too-large observers have run.
    fn try_single_post(&mut self, message: &Value) -> Result<bool> {
        if self.closed {
            return Err(StreamError::Closed);
        }

        let err = match self.port.post_message(message) {
            Ok(()) => {
                self.emit_log(message, Direction::Outgoing);
                return Ok(true);
            }
            Err(err) => err,
        };
        if !err.is_message_too_large() {
            return Err(StreamError::PostFailed(err));
        }

        let chunk_size = self.config.chunk_size;
        info!(chunk_size, error = %err, "message too large for a single post");
        self.emit_too_large(message, &err);
        if chunk_size == 0 {
            return Err(StreamError::PostFailed(err));
        }
        Ok(false)
    }

    fn start_frames(&mut self, message: &Value) -> Result<Frames> {
        self.encoder
            .frames(message, self.config.chunk_size)
            .map_err(|err| chunk_failed(0, err.into()))
    }

    fn post_frame(
        &mut self,
        frame: portchunk_frame::Result<OutboundFrame>,
        sent: &mut u64,
    ) -> Result<()> {
        let frame = frame.map_err(|err| chunk_failed(*sent, err.into()))?;
        let (id, seq, fin) = (frame.id(), frame.seq(), frame.fin());
        self.port
            .post_message(&frame.into_value())
            .map_err(|err| chunk_failed(*sent, StreamError::Transport(err)))?;
        *sent += 1;
        debug!(id, seq, fin, "sent frame");
        Ok(())
    }

    fn emit_too_large(&mut self, message: &Value, err: &TransportError) {
        let event = MessageTooLarge {
            message,
            chunk_size: self.config.chunk_size,
            original_error: err,
        };
        for observer in &mut self.too_large {
            observer(&event);
        }
    }

    fn emit_log(&mut self, message: &Value, direction: Direction) {
        if let Some(log) = self.log.as_mut() {
            log(message, direction);
        }
    }
}

impl<P> std::fmt::Debug for PortStream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortStream")
            .field("config", &self.config)
            .field("pending", &self.table.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn chunk_failed(frames_sent: u64, source: StreamError) -> StreamError {
    warn!(frames_sent, error = %source, "chunked send failed");
    StreamError::ChunkedPostFailed {
        frames_sent,
        source: Box::new(source),
    }
}

fn is_utf8_label(label: &str) -> bool {
    label.is_empty() || label.eq_ignore_ascii_case("utf8") || label.eq_ignore_ascii_case("utf-8")
}
