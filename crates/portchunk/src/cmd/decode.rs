use std::fs::File;
use std::io::{BufRead, BufReader};

use portchunk_frame::{try_parse, ReassemblyTable};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_payload, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input: Box<dyn BufRead> = match &args.file {
        Some(path) => Box::new(BufReader::new(File::open(path).map_err(|err| {
            io_error(&format!("failed opening {}", path.display()), err)
        })?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut decoder = Decoder::default();
    for (index, line) in input.lines().enumerate() {
        let line = line.map_err(|err| io_error("failed reading input", err))?;
        if let Some(payload) = decoder.feed_line(index + 1, &line)? {
            print_payload(&payload, format);
        }
    }

    let pending = decoder.table.pending_ids();
    if !pending.is_empty() {
        warn!(?pending, "input ended with incomplete messages");
        if args.strict {
            return Err(CliError::new(
                DATA_INVALID,
                format!("{} message(s) incomplete at end of input", pending.len()),
            ));
        }
    }
    Ok(SUCCESS)
}

#[derive(Default)]
struct Decoder {
    table: ReassemblyTable,
}

impl Decoder {
    /// Feed one line of input. Blank lines are skipped.
    fn feed_line(&mut self, line_no: usize, line: &str) -> CliResult<Option<Value>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let message: Value = serde_json::from_str(line).map_err(|err| {
            CliError::new(DATA_INVALID, format!("line {line_no} is not valid JSON: {err}"))
        })?;

        match try_parse(message) {
            Ok(frame) => {
                debug!(line = line_no, id = frame.id(), seq = frame.seq(), "frame");
                self.table
                    .on_frame(frame)
                    .map_err(|err| frame_error(&format!("line {line_no}"), err))
            }
            Err(plain) => Ok(Some(plain)),
        }
    }
}
