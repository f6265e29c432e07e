use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use portchunk_stream::{bind_with_config, StreamConfig};

use crate::cmd::ListenArgs;
use crate::exit::{stream_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_payload, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Print rebuilt payloads until the sender disconnects, `--count` is
/// reached, or Ctrl-C.
pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = if args.no_reassembly {
        StreamConfig::with_chunk_size(0)
    } else {
        StreamConfig::with_chunk_size(args.max_datagram)
    };
    let mut stream = bind_with_config(&args.path, config, args.max_datagram)
        .map_err(|err| stream_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let payload = match stream.try_read() {
            Ok(Some(payload)) => payload,
            Ok(None) if stream.is_closed() => break,
            Ok(None) => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(err) => return Err(stream_error("receive failed", err)),
        };

        print_payload(&payload, format);
        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
