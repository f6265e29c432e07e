#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/portchunk-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn portchunk() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_portchunk"));
    cmd.env_remove("PORTCHUNK_CHUNK_SIZE")
        .arg("--log-level")
        .arg("error");
    cmd
}

fn run_with_stdin(mut cmd: Command, stdin: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("command should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(stdin.as_bytes())
        .expect("stdin should accept input");
    child.wait_with_output().expect("command should finish")
}

#[test]
fn encode_raw_output_decodes_back() {
    let payload = json!({"list": (0..50).collect::<Vec<_>>(), "text": "ünïcödé ✓"});

    let mut encode = portchunk();
    encode.args(["--format", "raw", "encode", "--chunk-size", "40"]);
    let encoded = run_with_stdin(encode, &payload.to_string());
    assert!(encoded.status.success(), "encode failed: {encoded:?}");
    let frames = String::from_utf8(encoded.stdout).expect("utf-8 output");
    assert!(frames.lines().count() > 3);
    for line in frames.lines() {
        assert!(line.len() <= 40, "frame exceeds chunk size: {line}");
    }

    let mut decode = portchunk();
    decode.args(["--format", "raw", "decode", "--strict"]);
    let decoded = run_with_stdin(decode, &frames);
    assert!(decoded.status.success(), "decode failed: {decoded:?}");
    let text = String::from_utf8(decoded.stdout).expect("utf-8 output");
    let values: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(values, vec![payload]);
}

#[test]
fn encode_rejects_tiny_chunk_size() {
    let output = portchunk()
        .args(["encode", "--json", "1", "--chunk-size", "10"])
        .output()
        .expect("command should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn decode_strict_fails_on_incomplete_input() {
    let mut decode = portchunk();
    decode.args(["--format", "raw", "decode", "--strict"]);
    let output = run_with_stdin(decode, "\"5|0|0[1,2\"\n");
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn send_and_listen_over_datagram_socket() {
    let dir = unique_temp_dir("send-listen");
    let sock_path = dir.join("listen.sock");

    let listener = portchunk()
        .args(["--format", "raw", "listen"])
        .arg(&sock_path)
        .args(["--count", "1", "--max-datagram", "512"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen command should start");

    let start = Instant::now();
    while !sock_path.exists() {
        assert!(
            start.elapsed() < Duration::from_secs(3),
            "listener did not bind in time"
        );
        thread::sleep(Duration::from_millis(25));
    }

    let payload = json!({"blob": "z".repeat(3000)});
    let sent = portchunk()
        .arg("send")
        .arg(&sock_path)
        .arg("--json")
        .arg(payload.to_string())
        .args(["--chunk-size", "512", "--max-datagram", "512"])
        .output()
        .expect("send command should run");
    assert!(sent.status.success(), "send failed: {sent:?}");

    let output = listener.wait_with_output().expect("listener should exit");
    assert!(output.status.success(), "listen failed: {output:?}");
    let text = String::from_utf8(output.stdout).expect("utf-8 output");
    let received: Value = serde_json::from_str(text.trim()).expect("json payload");
    assert_eq!(received, payload);

    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn version_prints_name() {
    let output = portchunk()
        .arg("version")
        .output()
        .expect("command should run");
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).expect("utf-8 output");
    assert!(text.starts_with("portchunk "));
}
