//! # DAP session
//!
//! One state machine per TCP connection (spec §4.7, §5). A receiver task
//! reads framed requests and answers everything that doesn't touch the VM
//! directly; anything that does (`launch`, `setBreakpoints`, `stackTrace`,
//! `variables`, and the stepping commands) is handed to a second task that
//! owns `VmState` exclusively, so the VM is never touched from two places at
//! once. `pause` is the one exception: it flips a shared flag the run loop
//! polls between instructions, rather than round-tripping through the
//! executor's channel.

use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};

use casl2::assembler::assemble;
use casl2::source_map::SourceMap;
use casl2::vm::{self, StepOutcome, VmState};

use crate::codec::DapCodec;
use crate::error::DapError;
use crate::protocol::{Event, Request, Response};

type Writer<W> = Arc<Mutex<FramedWrite<W, DapCodec>>>;

#[derive(Default)]
struct RunControl {
    pause: AtomicBool,
}

/// A request routed to the executor task, with a reply channel when the
/// receiver needs the outcome to build its response.
enum ExecRequest {
    Launch { program: String, stop_on_entry: bool, reply: oneshot::Sender<Result<(), String>> },
    SetBreakpoints { lines: Vec<i64>, reply: oneshot::Sender<Vec<(i64, bool)>> },
    ConfigurationDone,
    StackTrace { reply: oneshot::Sender<Option<(usize, u16, String)>> },
    Variables { reply: oneshot::Sender<Vec<(&'static str, String)>> },
    Continue,
    Next,
    StepOut,
}

/// Drive one connection to completion. Generic over the stream so tests can
/// pass a `tokio::io::duplex` half instead of a real `TcpStream`.
pub async fn handle_connection<S>(stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let reader = FramedRead::new(read_half, DapCodec);
    let writer: Writer<_> = Arc::new(Mutex::new(FramedWrite::new(write_half, DapCodec)));
    let seq = Arc::new(AtomicU64::new(1));
    let control = Arc::new(RunControl::default());

    let (tx, rx) = mpsc::channel(16);

    let exec_writer = writer.clone();
    let exec_seq = seq.clone();
    let exec_control = control.clone();
    let executor = tokio::spawn(async move {
        run_executor(rx, exec_writer, exec_seq, exec_control).await;
    });

    receive_loop(reader, writer, seq, control, tx).await;
    let _ = executor.await;
}

async fn receive_loop<R>(
    mut reader: FramedRead<R, DapCodec>,
    writer: Writer<impl AsyncWrite + Unpin + Send + 'static>,
    seq: Arc<AtomicU64>,
    control: Arc<RunControl>,
    tx: mpsc::Sender<ExecRequest>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(frame) = reader.next().await {
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("dropping connection after frame error: {err}");
                return;
            }
        };

        let request: Request = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(err) => {
                let dap_err = DapError::MalformedFrame(err.to_string());
                log::warn!("{dap_err}");
                let s = seq.fetch_add(1, Ordering::SeqCst);
                let response = Response::err(s, 0, "unknown", dap_err.to_string());
                send_response(&writer, &seq, response).await;
                continue;
            }
        };

        log::info!("dispatching command {:?}", request.command);
        let should_close = dispatch(&request, &writer, &seq, &control, &tx).await;
        if should_close {
            return;
        }
    }
}

async fn send_response(writer: &Writer<impl AsyncWrite + Unpin>, seq: &AtomicU64, response: Response) {
    let payload = serde_json::to_vec(&response).expect("Response always serializes");
    let _ = seq.fetch_add(1, Ordering::SeqCst);
    let mut guard = writer.lock().await;
    if let Err(err) = guard.send(payload).await {
        log::warn!("failed to send response: {err}");
    }
}

async fn send_event(writer: &Writer<impl AsyncWrite + Unpin>, seq: &AtomicU64, name: &str, body: Option<Value>) {
    let s = seq.fetch_add(1, Ordering::SeqCst);
    let event = Event::new(s, name, body);
    let payload = serde_json::to_vec(&event).expect("Event always serializes");
    let mut guard = writer.lock().await;
    if let Err(err) = guard.send(payload).await {
        log::warn!("failed to send event: {err}");
    }
}

/// Returns `true` when the connection should be closed.
async fn dispatch(
    request: &Request,
    writer: &Writer<impl AsyncWrite + Unpin + Send + 'static>,
    seq: &Arc<AtomicU64>,
    control: &Arc<RunControl>,
    tx: &mpsc::Sender<ExecRequest>,
) -> bool {
    let command = request.command.as_str();
    let s = seq.fetch_add(1, Ordering::SeqCst);

    match command {
        "initialize" => {
            let body = json!({"supportsConfigurationDoneRequest": true, "supportsTerminateRequest": true});
            send_response(writer, seq, Response::ok(s, request.seq, command, Some(body))).await;
            send_event(writer, seq, "initialized", None).await;
            false
        }
        "attach" => {
            send_response(writer, seq, Response::err(s, request.seq, command, "not supported")).await;
            false
        }
        "launch" => {
            let program = request.arguments.get("program").and_then(Value::as_str).unwrap_or_default().to_string();
            let stop_on_entry = request.arguments.get("stopOnEntry").and_then(Value::as_bool).unwrap_or(false);
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(ExecRequest::Launch { program, stop_on_entry, reply: reply_tx }).await.is_err() {
                return true;
            }
            match reply_rx.await {
                Ok(Ok(())) => send_response(writer, seq, Response::ok(s, request.seq, command, None)).await,
                Ok(Err(msg)) => send_response(writer, seq, Response::err(s, request.seq, command, msg)).await,
                Err(_) => send_response(writer, seq, Response::err(s, request.seq, command, "executor gone")).await,
            }
            false
        }
        "setBreakpoints" => {
            let source_lines: Vec<i64> = request
                .arguments
                .get("breakpoints")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|bp| bp.get("line").and_then(Value::as_i64)).collect())
                .unwrap_or_default();
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(ExecRequest::SetBreakpoints { lines: source_lines, reply: reply_tx }).await.is_err() {
                return true;
            }
            let verified = reply_rx.await.unwrap_or_default();
            let body = json!({
                "breakpoints": verified.into_iter().map(|(line, ok)| json!({"verified": ok, "line": line})).collect::<Vec<_>>(),
            });
            send_response(writer, seq, Response::ok(s, request.seq, command, Some(body))).await;
            false
        }
        "configurationDone" => {
            send_response(writer, seq, Response::ok(s, request.seq, command, None)).await;
            let _ = tx.send(ExecRequest::ConfigurationDone).await;
            false
        }
        "threads" => {
            let body = json!({"threads": [{"id": 1, "name": "COMET2"}]});
            send_response(writer, seq, Response::ok(s, request.seq, command, Some(body))).await;
            false
        }
        "stackTrace" => {
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(ExecRequest::StackTrace { reply: reply_tx }).await.is_err() {
                return true;
            }
            let frame = reply_rx.await.ok().flatten();
            let body = match frame {
                Some((line, _pc, path)) => {
                    json!({"stackFrames": [{"id": 1, "name": "main", "line": line, "source": {"path": path}}]})
                }
                None => json!({"stackFrames": []}),
            };
            send_response(writer, seq, Response::ok(s, request.seq, command, Some(body))).await;
            false
        }
        "scopes" => {
            let body = json!({"scopes": [{"name": "Registers", "variablesReference": 1}]});
            send_response(writer, seq, Response::ok(s, request.seq, command, Some(body))).await;
            false
        }
        "variables" => {
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(ExecRequest::Variables { reply: reply_tx }).await.is_err() {
                return true;
            }
            let vars = reply_rx.await.unwrap_or_default();
            let body = json!({
                "variables": vars.into_iter().map(|(name, value)| json!({"name": name, "value": value, "variablesReference": 0})).collect::<Vec<_>>(),
            });
            send_response(writer, seq, Response::ok(s, request.seq, command, Some(body))).await;
            false
        }
        "continue" => {
            send_response(writer, seq, Response::ok(s, request.seq, command, None)).await;
            let _ = tx.send(ExecRequest::Continue).await;
            false
        }
        "next" | "stepIn" => {
            send_response(writer, seq, Response::ok(s, request.seq, command, None)).await;
            let _ = tx.send(ExecRequest::Next).await;
            false
        }
        "stepOut" => {
            send_response(writer, seq, Response::ok(s, request.seq, command, None)).await;
            let _ = tx.send(ExecRequest::StepOut).await;
            false
        }
        "pause" => {
            control.pause.store(true, Ordering::SeqCst);
            send_response(writer, seq, Response::ok(s, request.seq, command, None)).await;
            false
        }
        "disconnect" | "terminate" => {
            send_response(writer, seq, Response::ok(s, request.seq, command, None)).await;
            send_event(writer, seq, "terminated", None).await;
            true
        }
        other => {
            let dap_err = DapError::UnknownCommand(other.to_string());
            send_response(writer, seq, Response::err(s, request.seq, command, dap_err.to_string())).await;
            false
        }
    }
}

struct ExecutorState {
    vm: Option<VmState>,
    source_map: Option<SourceMap>,
    breakpoints: HashSet<u16>,
    stop_on_entry: bool,
    program: Option<String>,
}

async fn run_executor(
    mut rx: mpsc::Receiver<ExecRequest>,
    writer: Writer<impl AsyncWrite + Unpin + Send + 'static>,
    seq: Arc<AtomicU64>,
    control: Arc<RunControl>,
) {
    let mut state =
        ExecutorState { vm: None, source_map: None, breakpoints: HashSet::new(), stop_on_entry: false, program: None };

    while let Some(request) = rx.recv().await {
        match request {
            ExecRequest::Launch { program, stop_on_entry, reply } => {
                let result = launch(&mut state, &program, stop_on_entry);
                let _ = reply.send(result);
            }
            ExecRequest::SetBreakpoints { lines, reply } => {
                let verified = set_breakpoints(&mut state, &lines);
                let _ = reply.send(verified);
            }
            ExecRequest::ConfigurationDone => {
                if state.stop_on_entry {
                    send_event(&writer, &seq, "stopped", Some(json!({"reason": "entry"}))).await;
                } else {
                    run_loop(&mut state, &writer, &seq, &control).await;
                }
            }
            ExecRequest::Continue => run_loop(&mut state, &writer, &seq, &control).await,
            ExecRequest::Next => single_step(&mut state, &writer, &seq).await,
            ExecRequest::StepOut => step_out(&mut state, &writer, &seq, &control).await,
            ExecRequest::StackTrace { reply } => {
                let frame = state.vm.as_ref().and_then(|vm| {
                    state.source_map.as_ref().and_then(|m| m.line_for_address(vm.pc)).map(|line| {
                        (line, vm.pc, state.program.clone().unwrap_or_default())
                    })
                });
                let _ = reply.send(frame);
            }
            ExecRequest::Variables { reply } => {
                let vars = state.vm.as_ref().map(format_registers).unwrap_or_default();
                let _ = reply.send(vars);
            }
        }
    }
}

fn launch(state: &mut ExecutorState, program: &str, stop_on_entry: bool) -> Result<(), String> {
    let source = fs::read_to_string(program).map_err(|e| format!("failed to read {program}: {e}"))?;
    let result = assemble(&source);
    if !result.errors.is_empty() {
        let messages: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
        return Err(messages.join("; "));
    }
    let entry = result.entry_address.ok_or_else(|| "no START entry point".to_string())?;
    state.vm = Some(VmState::new(&result.image, entry));
    state.source_map = Some(result.source_map);
    state.stop_on_entry = stop_on_entry;
    state.breakpoints.clear();
    state.program = Some(program.to_string());
    Ok(())
}

fn set_breakpoints(state: &mut ExecutorState, lines: &[i64]) -> Vec<(i64, bool)> {
    state.breakpoints.clear();
    let Some(map) = state.source_map.as_ref() else {
        return lines.iter().map(|&line| (line, false)).collect();
    };
    lines
        .iter()
        .map(|&line| match map.address_for_line(line as usize) {
            Some(addr) => {
                state.breakpoints.insert(addr);
                (line, true)
            }
            None => (line, false),
        })
        .collect()
}

fn format_registers(vm: &VmState) -> Vec<(&'static str, String)> {
    let mut out = Vec::with_capacity(11);
    out.push(("PC", format!("#{:04X} ({})", vm.pc, vm.pc)));
    out.push(("FR", format!("{}", vm.fr)));
    for (&name, &raw) in GR_NAMES.iter().zip(vm.gr.iter()) {
        out.push((name, format!("#{:04X} ({})", raw, raw as i16)));
    }
    out.push(("SP", format!("#{:04X} ({})", vm.sp, vm.sp)));
    out
}

const GR_NAMES: [&str; 8] = ["GR0", "GR1", "GR2", "GR3", "GR4", "GR5", "GR6", "GR7"];

/// Autonomous run loop shared by `configurationDone` (without `stopOnEntry`),
/// `continue`, and as the inner step of `stepOut`. Breakpoints are checked
/// *after* stepping rather than before, so resuming from a breakpoint steps
/// past it instead of re-triggering immediately — see DESIGN.md.
async fn run_loop(
    state: &mut ExecutorState,
    writer: &Writer<impl AsyncWrite + Unpin + Send + 'static>,
    seq: &Arc<AtomicU64>,
    control: &RunControl,
) {
    loop {
        if control.pause.swap(false, Ordering::SeqCst) {
            send_event(writer, seq, "stopped", Some(json!({"reason": "pause"}))).await;
            return;
        }

        let Some(vm) = state.vm.as_mut() else { return };
        let outcome = vm::step(vm);
        match outcome {
            StepOutcome::Continue => {
                if state.breakpoints.contains(&state.vm.as_ref().unwrap().pc) {
                    send_event(writer, seq, "stopped", Some(json!({"reason": "breakpoint"}))).await;
                    return;
                }
                tokio::task::yield_now().await;
            }
            StepOutcome::AwaitInput => {
                send_event(writer, seq, "stopped", Some(json!({"reason": "pause", "description": "Waiting for input"})))
                    .await;
                return;
            }
            StepOutcome::Output(text) => {
                send_event(writer, seq, "output", Some(json!({"category": "stdout", "output": text}))).await;
                if state.breakpoints.contains(&state.vm.as_ref().unwrap().pc) {
                    send_event(writer, seq, "stopped", Some(json!({"reason": "breakpoint"}))).await;
                    return;
                }
                tokio::task::yield_now().await;
            }
            StepOutcome::Finished(_) => {
                send_event(writer, seq, "terminated", None).await;
                return;
            }
            other => {
                let reason = other.termination_reason().expect("non-Continue/Finished outcome is a termination");
                send_event(writer, seq, "stopped", Some(json!({"reason": "exception", "description": reason.to_string()})))
                    .await;
                return;
            }
        }
    }
}

async fn single_step(state: &mut ExecutorState, writer: &Writer<impl AsyncWrite + Unpin + Send + 'static>, seq: &Arc<AtomicU64>) {
    let Some(vm) = state.vm.as_mut() else { return };
    match vm::step(vm) {
        StepOutcome::Continue => {
            send_event(writer, seq, "stopped", Some(json!({"reason": "step"}))).await;
        }
        StepOutcome::AwaitInput => {
            send_event(writer, seq, "stopped", Some(json!({"reason": "pause", "description": "Waiting for input"})))
                .await;
        }
        StepOutcome::Output(text) => {
            send_event(writer, seq, "output", Some(json!({"category": "stdout", "output": text}))).await;
            send_event(writer, seq, "stopped", Some(json!({"reason": "step"}))).await;
        }
        StepOutcome::Finished(_) => {
            send_event(writer, seq, "terminated", None).await;
        }
        other => {
            let reason = other.termination_reason().expect("non-Continue/Finished outcome is a termination");
            send_event(writer, seq, "stopped", Some(json!({"reason": "exception", "description": reason.to_string()}))).await;
        }
    }
}

async fn step_out(
    state: &mut ExecutorState,
    writer: &Writer<impl AsyncWrite + Unpin + Send + 'static>,
    seq: &Arc<AtomicU64>,
    control: &RunControl,
) {
    loop {
        if control.pause.swap(false, Ordering::SeqCst) {
            send_event(writer, seq, "stopped", Some(json!({"reason": "pause"}))).await;
            return;
        }

        let Some(vm) = state.vm.as_mut() else { return };
        let mnemonic_before = vm::decoder::decode(vm.read(vm.pc)).map(|d| d.mnemonic);
        let outcome = vm::step(vm);
        match outcome {
            StepOutcome::Continue => {
                if mnemonic_before == Some("RET") {
                    send_event(writer, seq, "stopped", Some(json!({"reason": "step"}))).await;
                    return;
                }
                if state.breakpoints.contains(&state.vm.as_ref().unwrap().pc) {
                    send_event(writer, seq, "stopped", Some(json!({"reason": "breakpoint"}))).await;
                    return;
                }
                tokio::task::yield_now().await;
            }
            StepOutcome::AwaitInput => {
                send_event(writer, seq, "stopped", Some(json!({"reason": "pause", "description": "Waiting for input"})))
                    .await;
                return;
            }
            StepOutcome::Output(text) => {
                send_event(writer, seq, "output", Some(json!({"category": "stdout", "output": text}))).await;
                if state.breakpoints.contains(&state.vm.as_ref().unwrap().pc) {
                    send_event(writer, seq, "stopped", Some(json!({"reason": "breakpoint"}))).await;
                    return;
                }
                tokio::task::yield_now().await;
            }
            StepOutcome::Finished(_) => {
                send_event(writer, seq, "terminated", None).await;
                return;
            }
            other => {
                let reason = other.termination_reason().expect("non-Continue/Finished outcome is a termination");
                send_event(writer, seq, "stopped", Some(json!({"reason": "exception", "description": reason.to_string()})))
                    .await;
                return;
            }
        }
    }
}
