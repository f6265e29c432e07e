use portchunk_frame::{FrameEncoder, OutboundFrame};
use tracing::info;

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frames, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = args.payload.resolve()?;
    let frames = encode_frames(&payload, args.chunk_size, args.start_after)?;
    info!(frames = frames.len(), chunk_size = args.chunk_size, "encoded payload");
    print_frames(&frames, format);
    Ok(SUCCESS)
}

fn encode_frames(
    payload: &serde_json::Value,
    chunk_size: usize,
    start_after: u32,
) -> CliResult<Vec<OutboundFrame>> {
    let mut encoder = FrameEncoder::starting_after(start_after);
    encoder
        .frames(payload, chunk_size)
        .and_then(|frames| frames.collect::<Result<Vec<_>, _>>())
        .map_err(|err| frame_error("encode failed", err))
}
