use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use starlark_config::{BridgeConfig, DebugServerConfig};
use starlark_wire::{ClientEvent, DebugClient, Stepping};
use tokio::sync::{broadcast, mpsc};

use crate::{
    breakpoints::SourceBreakpoint,
    dap_tokio::{DapReader, DapWriter, Event, MessageKind, Request, Response, Result},
    error::DebuggerError,
    launch::LaunchArguments,
    session::{Debugger, SessionEvent},
};

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Connection defaults for `launch`/`attach` arguments that are not set.
    pub debug_server: DebugServerConfig,
}

impl From<&BridgeConfig> for ServerOptions {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            debug_server: config.debug_server.clone(),
        }
    }
}

/// Run the adapter over stdio until the client disconnects.
pub async fn run_stdio(config: &BridgeConfig) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    run_with_options(stdin, stdout, ServerOptions::from(config))
        .await
        .map_err(anyhow::Error::from)
}

pub async fn run_with_options<R, W>(reader: R, writer: W, options: ServerOptions) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let out = Outgoing {
        tx: out_tx,
        seq: Arc::new(AtomicI64::new(1)),
        terminated: Arc::new(AtomicBool::new(false)),
    };
    let session = SessionSlot::default();

    let writer_task = tokio::spawn(async move {
        let mut writer = DapWriter::new(writer);
        while let Some(msg) = out_rx.recv().await {
            if let Err(err) = writer.write_message(&msg).await {
                tracing::warn!(target: "starlark.dap", error = %err, "failed to write DAP message");
            }
        }
    });

    let mut reader = DapReader::new(reader);

    while let Some(request) = reader.read_request().await? {
        if request.kind != MessageKind::Request {
            continue;
        }
        tracing::debug!(
            target: "starlark.dap",
            seq = request.seq,
            command = %request.command,
            "request"
        );

        match request.command.as_str() {
            "initialize" => {
                let body = json!({
                    "supportsConfigurationDoneRequest": true,
                    "supportsEvaluateForHovers": true,
                    "supportsConditionalBreakpoints": true,
                    "supportsSetVariable": false,
                    "supportsStepBack": false,
                });
                out.respond(&request, true, Some(body), None);
            }
            "launch" | "attach" => launch(&out, &session, &options, request),
            "setBreakpoints" => {
                let mut args: SetBreakpointsArguments = match parse_arguments(&request) {
                    Ok(args) => args,
                    Err(err) => {
                        out.fail(&request, err);
                        continue;
                    }
                };
                let Some(path) = args.source.path.take() else {
                    out.fail(
                        &request,
                        DebuggerError::InvalidRequest("setBreakpoints.source.path is required".to_string()),
                    );
                    continue;
                };
                let breakpoints = args.into_breakpoints();
                with_session(&out, &session, request, move |dbg| async move {
                    dbg.set_breakpoints(&path, breakpoints)
                        .await
                        .map(|breakpoints| Some(json!({ "breakpoints": breakpoints })))
                });
            }
            "configurationDone" => {
                with_session(&out, &session, request, |dbg| async move {
                    dbg.configuration_done().await.map(|()| None::<Value>)
                });
            }
            "threads" => {
                let threads = session.get().map(|dbg| dbg.threads()).unwrap_or_default();
                out.respond(&request, true, Some(json!({ "threads": threads })), None);
            }
            "stackTrace" => {
                let thread_id = match required_i64(&request, "threadId") {
                    Ok(id) => id,
                    Err(err) => {
                        out.fail(&request, err);
                        continue;
                    }
                };
                with_session(&out, &session, request, move |dbg| async move {
                    dbg.stack_trace(thread_id).await.map(|frames| {
                        Some(json!({ "totalFrames": frames.len(), "stackFrames": frames }))
                    })
                });
            }
            "scopes" => {
                let frame_id = match required_i64(&request, "frameId") {
                    Ok(id) => id,
                    Err(err) => {
                        out.fail(&request, err);
                        continue;
                    }
                };
                let scopes = session.get().map(|dbg| dbg.scopes(frame_id)).unwrap_or_default();
                out.respond(&request, true, Some(json!({ "scopes": scopes })), None);
            }
            "variables" => {
                let reference = match required_i64(&request, "variablesReference") {
                    Ok(id) => id,
                    Err(err) => {
                        out.fail(&request, err);
                        continue;
                    }
                };
                with_session(&out, &session, request, move |dbg| async move {
                    dbg.variables(reference)
                        .await
                        .map(|variables| Some(json!({ "variables": variables })))
                });
            }
            "evaluate" => {
                let Some(expression) = request
                    .arguments
                    .get("expression")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                else {
                    out.fail(
                        &request,
                        DebuggerError::InvalidRequest("evaluate.expression is required".to_string()),
                    );
                    continue;
                };
                let frame_id = request
                    .arguments
                    .get("frameId")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                with_session(&out, &session, request, move |dbg| async move {
                    dbg.evaluate(frame_id, &expression)
                        .await
                        .map(|result| Some(serde_json::to_value(result).unwrap_or_else(|_| json!({}))))
                });
            }
            "continue" | "next" | "stepIn" | "stepOut" => {
                let thread_id = match required_i64(&request, "threadId") {
                    Ok(id) => id,
                    Err(err) => {
                        out.fail(&request, err);
                        continue;
                    }
                };
                let stepping = match request.command.as_str() {
                    "next" => Stepping::Over,
                    "stepIn" => Stepping::Into,
                    "stepOut" => Stepping::Out,
                    _ => Stepping::None,
                };
                with_session(&out, &session, request, move |dbg| async move {
                    dbg.resume(thread_id, stepping).await.map(|()| {
                        (stepping == Stepping::None).then(|| json!({ "allThreadsContinued": false }))
                    })
                });
            }
            "pause" => {
                let thread_id = request
                    .arguments
                    .get("threadId")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                with_session(&out, &session, request, move |dbg| async move {
                    dbg.pause(thread_id).await.map(|()| None::<Value>)
                });
            }
            "disconnect" => {
                if let Some(dbg) = session.take() {
                    dbg.disconnect().await;
                }
                out.respond(&request, true, None, None);
                out.terminated();
                break;
            }
            _ => {
                out.respond(
                    &request,
                    true,
                    None,
                    Some(format!("unhandled request {}", request.command)),
                );
            }
        }
    }

    // Client went away without `disconnect`.
    if let Some(dbg) = session.take() {
        dbg.disconnect().await;
    }

    drop(out);
    let _ = writer_task.await;
    Ok(())
}

/// Cloneable handle on the outgoing DAP message queue.
#[derive(Clone)]
struct Outgoing {
    tx: mpsc::UnboundedSender<Value>,
    seq: Arc<AtomicI64>,
    terminated: Arc<AtomicBool>,
}

impl Outgoing {
    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn respond(&self, request: &Request, success: bool, body: Option<Value>, message: Option<String>) {
        let resp = Response::for_request(self.next_seq(), request, success, body, message);
        let _ = self
            .tx
            .send(serde_json::to_value(resp).unwrap_or_else(|_| json!({})));
    }

    fn fail(&self, request: &Request, err: DebuggerError) {
        tracing::debug!(
            target: "starlark.dap",
            command = %request.command,
            error = %err,
            "request failed"
        );
        self.respond(request, false, None, Some(err.to_string()));
    }

    fn finish(&self, request: &Request, result: crate::error::Result<Option<Value>>) {
        match result {
            Ok(body) => self.respond(request, true, body, None),
            Err(err) => self.fail(request, err),
        }
    }

    fn event(&self, event: impl Into<String>, body: Option<Value>) {
        let evt = Event::new(self.next_seq(), event, body);
        let _ = self
            .tx
            .send(serde_json::to_value(evt).unwrap_or_else(|_| json!({})));
    }

    fn output(&self, category: &str, text: impl Into<String>) {
        let mut text = text.into();
        text.push('\n');
        self.event("output", Some(json!({ "category": category, "output": text })));
    }

    /// Sends `terminated` at most once per server run.
    fn terminated(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            self.event("terminated", None);
        }
    }

    fn session_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Thread { thread_id, reason } => {
                self.event("thread", Some(json!({ "reason": reason, "threadId": thread_id })));
            }
            SessionEvent::Stopped {
                thread_id,
                reason,
                description,
                text,
            } => {
                let mut body = json!({
                    "reason": reason,
                    "description": description,
                    "threadId": thread_id,
                    "allThreadsStopped": false,
                });
                if let Some(text) = text {
                    body["text"] = Value::String(text);
                }
                self.event("stopped", Some(body));
            }
            SessionEvent::Continued { thread_id } => {
                self.event(
                    "continued",
                    Some(json!({ "threadId": thread_id, "allThreadsContinued": false })),
                );
            }
        }
    }
}

#[derive(Clone, Default)]
struct SessionSlot(Arc<Mutex<Option<Arc<Debugger>>>>);

impl SessionSlot {
    fn get(&self) -> Option<Arc<Debugger>> {
        self.0.lock().clone()
    }

    fn set(&self, dbg: Arc<Debugger>) {
        *self.0.lock() = Some(dbg);
    }

    fn take(&self) -> Option<Arc<Debugger>> {
        self.0.lock().take()
    }

    /// Clear the slot if it still holds `dbg`.
    fn clear_if(&self, dbg: &Arc<Debugger>) {
        let mut slot = self.0.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, dbg)) {
            *slot = None;
        }
    }
}

/// Run `f` against the current session on its own task, so slow wire calls
/// never hold up the request loop.
fn with_session<F, Fut>(out: &Outgoing, session: &SessionSlot, request: Request, f: F)
where
    F: FnOnce(Arc<Debugger>) -> Fut,
    Fut: Future<Output = crate::error::Result<Option<Value>>> + Send + 'static,
{
    let Some(dbg) = session.get() else {
        out.fail(&request, DebuggerError::NotConnected);
        return;
    };
    let out = out.clone();
    let fut = f(dbg);
    tokio::spawn(async move {
        let result = fut.await;
        out.finish(&request, result);
    });
}

fn launch(out: &Outgoing, session: &SessionSlot, options: &ServerOptions, request: Request) {
    if session.get().is_some() {
        out.fail(
            &request,
            DebuggerError::InvalidRequest("a debug session is already running".to_string()),
        );
        return;
    }

    let args: LaunchArguments = match parse_arguments(&request) {
        Ok(args) => args,
        Err(err) => {
            out.fail(&request, err);
            return;
        }
    };
    let config = args.client_config(&options.debug_server);
    let target = format!("{}:{}", config.host, config.port);

    let client = DebugClient::new(config);
    let events = client.subscribe();
    let dbg = Arc::new(Debugger::new(client.clone(), args.workspace_root()));
    session.set(dbg.clone());
    spawn_event_task(Arc::downgrade(&dbg), events, out.clone(), args.verbose);

    if args.verbose {
        out.output("console", format!("Connecting to Starlark debug server at {target}"));
    }
    tracing::info!(target: "starlark.dap", addr = %target, "connecting to debug server");

    let out = out.clone();
    let session = session.clone();
    tokio::spawn(async move {
        match client.connect().await {
            Ok(()) => {
                out.respond(&request, true, None, None);
                out.event("initialized", None);
            }
            Err(err) => {
                tracing::error!(target: "starlark.dap", addr = %target, error = %err, "launch failed");
                session.clear_if(&dbg);
                out.respond(
                    &request,
                    false,
                    None,
                    Some(format!("failed to connect to debug server at {target}: {err}")),
                );
            }
        }
    });
}

/// Forward debug server events to the client until the connection ends.
///
/// Holds the session weakly so a failed launch lets the client (and with it the
/// event channel) drop.
fn spawn_event_task(
    dbg: Weak<Debugger>,
    mut events: broadcast::Receiver<ClientEvent>,
    out: Outgoing,
    verbose: bool,
) {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "starlark.dap", skipped, "dropped debug server events");
                    continue;
                }
            };

            match event {
                ClientEvent::ConnectFailed { attempt, error } => {
                    if verbose {
                        out.output("console", format!("Connection attempt {attempt} failed: {error}"));
                    }
                }
                ClientEvent::Connected => {
                    if verbose {
                        out.output("console", "Connected to Starlark debug server");
                    }
                }
                ClientEvent::Debug(payload) => {
                    let Some(dbg) = dbg.upgrade() else {
                        return;
                    };
                    for event in dbg.handle_event(&payload) {
                        out.session_event(event);
                    }
                }
                ClientEvent::Disconnected { error } => {
                    if let Some(error) = error {
                        out.output("stderr", format!("Lost connection to debug server: {error}"));
                    }
                    out.terminated();
                    return;
                }
            }
        }
    });
}

#[derive(Debug, Default, Deserialize)]
struct SetBreakpointsArguments {
    source: SourceArgument,
    #[serde(default)]
    breakpoints: Option<Vec<SourceBreakpointArgument>>,
    /// Deprecated form of `breakpoints`.
    #[serde(default)]
    lines: Option<Vec<i32>>,
}

impl SetBreakpointsArguments {
    fn into_breakpoints(self) -> Vec<SourceBreakpoint> {
        match (self.breakpoints, self.lines) {
            (Some(breakpoints), _) => breakpoints
                .into_iter()
                .map(|bp| SourceBreakpoint::new(bp.line, bp.condition))
                .collect(),
            (None, Some(lines)) => lines
                .into_iter()
                .map(|line| SourceBreakpoint::new(line, None))
                .collect(),
            (None, None) => Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SourceArgument {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SourceBreakpointArgument {
    line: i32,
    #[serde(default)]
    condition: Option<String>,
}

fn parse_arguments<T>(request: &Request) -> std::result::Result<T, DebuggerError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if request.arguments.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(request.arguments.clone()).map_err(|err| {
        DebuggerError::InvalidRequest(format!("invalid {} arguments: {err}", request.command))
    })
}

fn required_i64(request: &Request, field: &str) -> std::result::Result<i64, DebuggerError> {
    request
        .arguments
        .get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| {
            DebuggerError::InvalidRequest(format!("{}.{field} is required", request.command))
        })
}
