use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use portchunk_frame::OutboundFrame;
use serde::Serialize;
use serde_json::Value;

const PREVIEW_CHARS: usize = 48;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// One JSON value per line, exactly as it would be posted.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    id: u32,
    seq: u64,
    fin: bool,
    wire_size: usize,
    frame: &'a str,
}

#[derive(Serialize)]
struct PayloadOutput<'a> {
    size: usize,
    payload: &'a Value,
    timestamp: String,
}

pub fn print_frames(frames: &[OutboundFrame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for frame in frames {
                let wire = frame.to_wire();
                let out = FrameOutput {
                    id: frame.id(),
                    seq: frame.seq(),
                    fin: frame.fin(),
                    wire_size: frame.wire_size(),
                    frame: &wire,
                };
                print_line(&serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string()));
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "SEQ", "FIN", "SIZE", "DATA"]);
            for frame in frames {
                table.add_row(vec![
                    frame.id().to_string(),
                    frame.seq().to_string(),
                    u8::from(frame.fin()).to_string(),
                    frame.wire_size().to_string(),
                    preview(frame.data()),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!(
                    "id={} seq={} fin={} size={} data={}",
                    frame.id(),
                    frame.seq(),
                    u8::from(frame.fin()),
                    frame.wire_size(),
                    preview(frame.data())
                );
            }
        }
        OutputFormat::Raw => {
            for frame in frames {
                let value = Value::String(frame.to_wire());
                print_line(&value.to_string());
            }
        }
    }
}

pub fn print_payload(payload: &Value, format: OutputFormat) {
    let text = payload.to_string();
    match format {
        OutputFormat::Json => {
            let out = PayloadOutput {
                size: text.len(),
                payload,
                timestamp: now_unix_seconds(),
            };
            print_line(&serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string()));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SIZE", "PAYLOAD"])
                .add_row(vec![text.len().to_string(), preview(&text)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("size={} payload={}", text.len(), preview(&text));
        }
        OutputFormat::Raw => print_line(&text),
    }
}

fn print_line(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

/// Shorten long text for human-facing formats, keeping whole characters.
fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}… ({} bytes)", &text[..end], text.len()),
        None => text.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
