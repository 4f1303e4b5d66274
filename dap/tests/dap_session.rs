//! End-to-end scenarios S5 and S6 (spec.md §8) driven over an in-process
//! duplex pipe instead of a real socket.

use std::fs;

use casl2_dap::codec::DapCodec;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

const S1_PROGRAM: &str = "MAIN START\n     LD    GR0,=10\n     LD    GR1,=20\n     ADDA  GR0,GR1\n     RET\n     END\n";

fn write_temp_program(name: &str, source: &str) -> String {
    let path = std::env::temp_dir().join(format!("casl2_dap_test_{name}_{}.casl", std::process::id()));
    fs::write(&path, source).unwrap();
    path.to_string_lossy().into_owned()
}

async fn send(writer: &mut FramedWrite<impl AsyncWrite + Unpin, DapCodec>, value: Value) {
    let bytes = serde_json::to_vec(&value).unwrap();
    writer.send(bytes).await.unwrap();
}

async fn recv(reader: &mut FramedRead<impl AsyncRead + Unpin, DapCodec>) -> Value {
    let bytes = reader.next().await.expect("stream ended unexpectedly").expect("frame error");
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn s5_dap_happy_path() {
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(casl2_dap::handle_connection(server));
    let (read_half, write_half) = tokio::io::split(client);
    let mut reader = FramedRead::new(read_half, DapCodec);
    let mut writer = FramedWrite::new(write_half, DapCodec);

    let program = write_temp_program("s5", S1_PROGRAM);

    send(&mut writer, json!({"seq": 1, "type": "request", "command": "initialize"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true);
    let ev = recv(&mut reader).await;
    assert_eq!(ev["event"], "initialized");

    send(
        &mut writer,
        json!({"seq": 2, "type": "request", "command": "launch", "arguments": {"program": program, "stopOnEntry": true}}),
    )
    .await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true, "launch should succeed: {resp}");

    send(&mut writer, json!({"seq": 3, "type": "request", "command": "configurationDone"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true);
    let ev = recv(&mut reader).await;
    assert_eq!(ev["event"], "stopped");
    assert_eq!(ev["body"]["reason"], "entry");

    send(&mut writer, json!({"seq": 4, "type": "request", "command": "scopes"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["body"]["scopes"][0]["variablesReference"], 1);

    send(
        &mut writer,
        json!({"seq": 5, "type": "request", "command": "variables", "arguments": {"variablesReference": 1}}),
    )
    .await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["body"]["variables"].as_array().unwrap().len(), 11);

    send(&mut writer, json!({"seq": 6, "type": "request", "command": "next"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true);
    let ev = recv(&mut reader).await;
    assert_eq!(ev["event"], "stopped");
    assert_eq!(ev["body"]["reason"], "step");

    send(&mut writer, json!({"seq": 7, "type": "request", "command": "continue"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true);
    let ev = recv(&mut reader).await;
    assert_eq!(ev["event"], "terminated");

    let _ = fs::remove_file(program);
}

#[tokio::test]
async fn malformed_json_body_gets_a_success_false_response_not_a_dropped_connection() {
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(casl2_dap::handle_connection(server));
    let (read_half, write_half) = tokio::io::split(client);
    let mut reader = FramedRead::new(read_half, DapCodec);
    let mut writer = FramedWrite::new(write_half, DapCodec);

    writer.send(b"{not valid json".to_vec()).await.unwrap();
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], false);
    assert!(!resp["message"].as_str().unwrap().is_empty());

    // The connection stays open: a well-formed request right after still works.
    send(&mut writer, json!({"seq": 1, "type": "request", "command": "initialize"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true);
}

#[tokio::test]
async fn stack_trace_reports_the_launched_program_path() {
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(casl2_dap::handle_connection(server));
    let (read_half, write_half) = tokio::io::split(client);
    let mut reader = FramedRead::new(read_half, DapCodec);
    let mut writer = FramedWrite::new(write_half, DapCodec);

    let program = write_temp_program("stacktrace", S1_PROGRAM);

    send(&mut writer, json!({"seq": 1, "type": "request", "command": "initialize"})).await;
    recv(&mut reader).await;
    recv(&mut reader).await;

    send(
        &mut writer,
        json!({"seq": 2, "type": "request", "command": "launch", "arguments": {"program": program, "stopOnEntry": true}}),
    )
    .await;
    recv(&mut reader).await;

    send(&mut writer, json!({"seq": 3, "type": "request", "command": "configurationDone"})).await;
    recv(&mut reader).await;
    recv(&mut reader).await;

    send(&mut writer, json!({"seq": 4, "type": "request", "command": "stackTrace"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["body"]["stackFrames"][0]["source"]["path"], program);

    let _ = fs::remove_file(program);
}

#[tokio::test]
async fn s6_breakpoint_then_continue_terminates() {
    let (client, server) = tokio::io::duplex(8192);
    tokio::spawn(casl2_dap::handle_connection(server));
    let (read_half, write_half) = tokio::io::split(client);
    let mut reader = FramedRead::new(read_half, DapCodec);
    let mut writer = FramedWrite::new(write_half, DapCodec);

    let program = write_temp_program("s6", S1_PROGRAM);

    send(&mut writer, json!({"seq": 1, "type": "request", "command": "initialize"})).await;
    recv(&mut reader).await;
    recv(&mut reader).await;

    send(
        &mut writer,
        json!({"seq": 2, "type": "request", "command": "launch", "arguments": {"program": program, "stopOnEntry": false}}),
    )
    .await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true, "launch should succeed: {resp}");

    // Line 4 is `ADDA GR0,GR1`.
    send(
        &mut writer,
        json!({"seq": 3, "type": "request", "command": "setBreakpoints", "arguments": {"breakpoints": [{"line": 4}]}}),
    )
    .await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["body"]["breakpoints"][0]["verified"], true, "{resp}");

    send(&mut writer, json!({"seq": 4, "type": "request", "command": "configurationDone"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true);
    let ev = recv(&mut reader).await;
    assert_eq!(ev["event"], "stopped");
    assert_eq!(ev["body"]["reason"], "breakpoint");

    send(&mut writer, json!({"seq": 5, "type": "request", "command": "continue"})).await;
    let resp = recv(&mut reader).await;
    assert_eq!(resp["success"], true);
    let ev = recv(&mut reader).await;
    assert_eq!(ev["event"], "terminated");

    let _ = fs::remove_file(program);
}
