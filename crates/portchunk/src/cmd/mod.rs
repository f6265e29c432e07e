use std::io::Read;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use portchunk_stream::CHUNK_SIZE_ENV;
use portchunk_transport::datagram::DEFAULT_MAX_DATAGRAM;
use serde_json::Value;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a JSON payload into frames and print them.
    Encode(EncodeArgs),
    /// Rebuild payloads from posted messages, one JSON value per line.
    Decode(DecodeArgs),
    /// Send one payload to a datagram socket, chunking if it is too large.
    Send(SendArgs),
    /// Bind a datagram socket and print rebuilt payloads.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where a payload comes from. Stdin is read when no flag is given.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload, sent as a JSON string.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read a JSON payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Value> {
        if let Some(json) = &self.json {
            return parse_json("--json", json);
        }
        if let Some(data) = &self.data {
            return Ok(Value::String(data.clone()));
        }
        if let Some(path) = &self.file {
            let text = std::fs::read_to_string(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            return parse_json(&path.display().to_string(), &text);
        }

        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|err| io_error("failed reading stdin", err))?;
        parse_json("stdin", &text)
    }
}

fn parse_json(source: &str, text: &str) -> CliResult<Value> {
    serde_json::from_str(text)
        .map_err(|err| CliError::new(USAGE, format!("{source} is not valid JSON: {err}")))
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Maximum bytes per frame (min 24).
    #[arg(long, env = CHUNK_SIZE_ENV, default_value_t = DEFAULT_MAX_DATAGRAM)]
    pub chunk_size: usize,
    /// Number the message as if this many had been chunked before it.
    #[arg(long, default_value_t = 0)]
    pub start_after: u32,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Read messages from file instead of stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Fail if any message is left incomplete at end of input.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to send to.
    pub path: PathBuf,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Maximum bytes per frame. 0 disables chunking.
    #[arg(long, env = CHUNK_SIZE_ENV, default_value_t = DEFAULT_MAX_DATAGRAM)]
    pub chunk_size: usize,
    /// Largest datagram the socket will carry.
    #[arg(long, default_value_t = DEFAULT_MAX_DATAGRAM)]
    pub max_datagram: usize,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N payloads.
    #[arg(long)]
    pub count: Option<usize>,
    /// Largest datagram to accept.
    #[arg(long, default_value_t = DEFAULT_MAX_DATAGRAM)]
    pub max_datagram: usize,
    /// Treat incoming frames as plain messages instead of reassembling them.
    #[arg(long)]
    pub no_reassembly: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
