use portchunk_stream::{connect_with_config, StreamConfig};
use tracing::info;

use crate::cmd::SendArgs;
use crate::exit::{stream_error, CliResult, SUCCESS};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let payload = args.payload.resolve()?;
    let config = StreamConfig::with_chunk_size(args.chunk_size);

    let mut stream = connect_with_config(&args.path, config, args.max_datagram)
        .map_err(|err| stream_error("connect failed", err))?;
    stream.on_message_too_large(|event| {
        info!(
            chunk_size = event.chunk_size,
            error = %event.original_error,
            "payload exceeds one datagram"
        );
    });

    stream
        .write(&payload)
        .map_err(|err| stream_error("send failed", err))?;
    info!(path = %args.path.display(), "sent payload");

    Ok(SUCCESS)
}
