use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    sync::watch,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    codec::DelimitedCodec,
    proto::{
        debug_event, debug_request, Breakpoint, ContinueExecutionResponse, DebugEvent,
        DebugRequest, Error, EvaluateResponse, Frame, GetChildrenResponse, ListFramesResponse,
        PauseReason, PauseThreadResponse, PausedThread, SetBreakpointsResponse,
        StartDebuggingResponse, Stepping, ThreadContinuedEvent, ThreadPausedEvent, Value,
    },
    ThreadId,
};

/// A tiny Starlark debug server used for unit/integration testing.
///
/// It answers every request kind from canned data in [`MockDebugServerConfig`]
/// and records the requests it received, so `starlark-dap` can be exercised
/// without a real interpreter.
pub struct MockDebugServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<State>,
}

#[derive(Clone, Debug)]
pub enum MockEvaluation {
    Value(Value),
    /// Answered with an `Error` payload carrying this message.
    Error(String),
}

#[derive(Clone, Debug)]
pub struct MockDebugServerConfig {
    /// `ListFrames` replies keyed by thread id.
    pub frames: HashMap<ThreadId, Vec<Frame>>,
    /// `GetChildren` replies keyed by value id.
    pub children: HashMap<i64, Vec<Value>>,
    /// `Evaluate` replies keyed by statement. Unknown statements get an error
    /// in the style of the interpreter (`name 'x' is not defined`).
    pub evaluations: HashMap<String, MockEvaluation>,
    /// Emitted as a `ThreadPaused` event right after `StartDebugging`.
    pub initial_pause: Option<PausedThread>,
    /// Emit `ThreadContinued` after every `ContinueExecution`.
    pub continued_events: bool,
    /// After a stepping `ContinueExecution`, report the thread paused again
    /// with reason `Stepping`.
    pub pause_after_step: bool,
    /// Thread reported paused for `PauseThread` requests with thread id `0`.
    pub default_thread_id: ThreadId,
    /// Hold every `ListFrames` reply back for this long. Requests behind it on
    /// the same connection wait too.
    pub list_frames_delay: Option<Duration>,
}

impl Default for MockDebugServerConfig {
    fn default() -> Self {
        Self {
            frames: HashMap::new(),
            children: HashMap::new(),
            evaluations: HashMap::new(),
            initial_pause: None,
            continued_events: true,
            pause_after_step: true,
            default_thread_id: 1,
            list_frames_delay: None,
        }
    }
}

impl MockDebugServer {
    pub async fn spawn() -> std::io::Result<Self> {
        Self::spawn_with_config(Default::default()).await
    }

    pub async fn spawn_with_config(config: MockDebugServerConfig) -> std::io::Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let state = Arc::new(State::new(config));
        let task_shutdown = shutdown.clone();
        let task_state = state.clone();

        tokio::spawn(async move {
            let _ = run(listener, task_state, task_shutdown).await;
        });

        Ok(Self {
            addr,
            shutdown,
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<DebugRequest> {
        self.state.requests.lock().await.clone()
    }

    /// The breakpoint set from the most recent `SetBreakpoints` request.
    pub async fn breakpoints(&self) -> Vec<Breakpoint> {
        self.state.breakpoints.lock().await.clone()
    }

    /// Number of client connections accepted so far.
    pub fn connections(&self) -> u32 {
        *self.state.connections.borrow()
    }

    /// Push an unsolicited event (sequence number `0`) to the client, waiting
    /// for the first connection if none has been accepted yet.
    pub async fn emit(&self, payload: debug_event::Payload) -> std::io::Result<()> {
        let mut connections = self.state.connections.subscribe();
        if connections.wait_for(|count| *count > 0).await.is_err() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "mock server stopped",
            ));
        }
        self.state.send(0, payload).await
    }

    /// Close the current client connection, as if the interpreter exited.
    pub async fn disconnect(&self) {
        if let Some(conn) = self.state.connection.lock().await.take() {
            conn.cancel();
        }
        self.state.writer.lock().await.take();
    }
}

impl Drop for MockDebugServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

type Writer = FramedWrite<OwnedWriteHalf, DelimitedCodec<DebugRequest>>;

struct State {
    config: MockDebugServerConfig,
    requests: tokio::sync::Mutex<Vec<DebugRequest>>,
    breakpoints: tokio::sync::Mutex<Vec<Breakpoint>>,
    writer: tokio::sync::Mutex<Option<Writer>>,
    connection: tokio::sync::Mutex<Option<CancellationToken>>,
    connections: watch::Sender<u32>,
}

impl State {
    fn new(config: MockDebugServerConfig) -> Self {
        Self {
            config,
            requests: tokio::sync::Mutex::new(Vec::new()),
            breakpoints: tokio::sync::Mutex::new(Vec::new()),
            writer: tokio::sync::Mutex::new(None),
            connection: tokio::sync::Mutex::new(None),
            connections: watch::channel(0).0,
        }
    }

    async fn send(&self, sequence_number: u64, payload: debug_event::Payload) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no debugger client connected",
            ));
        };
        writer
            .send(DebugEvent {
                sequence_number,
                payload: Some(payload),
            })
            .await
            .map_err(|err| std::io::Error::other(err.to_string()))
    }

    fn paused(&self, id: ThreadId, reason: PauseReason) -> PausedThread {
        let location = self
            .config
            .frames
            .get(&id)
            .and_then(|frames| frames.first())
            .and_then(|frame| frame.location.clone());
        PausedThread {
            id,
            name: format!("thread-{id}"),
            pause_reason: reason as i32,
            location,
            conditional_breakpoint_error: None,
        }
    }
}

async fn run(
    listener: TcpListener,
    state: Arc<State>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accept = listener.accept() => {
                let (socket, _) = accept?;
                let conn = shutdown.child_token();
                if let Some(previous) = state.connection.lock().await.replace(conn.clone()) {
                    previous.cancel();
                }
                tokio::spawn(serve(socket, state.clone(), conn));
            }
        }
    }
}

async fn serve(socket: TcpStream, state: Arc<State>, conn: CancellationToken) {
    let (read, write) = socket.into_split();
    *state.writer.lock().await = Some(FramedWrite::new(write, DelimitedCodec::new()));
    state.connections.send_modify(|count| *count += 1);
    let mut reader = FramedRead::new(read, DelimitedCodec::<DebugRequest>::new());

    loop {
        let next = tokio::select! {
            _ = conn.cancelled() => break,
            next = reader.next() => next,
        };
        let Some(Ok(request)) = next else {
            break;
        };
        if handle_request(&state, request).await.is_err() {
            break;
        }
    }
}

async fn handle_request(state: &State, request: DebugRequest) -> std::io::Result<()> {
    state.requests.lock().await.push(request.clone());
    let seq = request.sequence_number;
    let Some(payload) = request.payload else {
        return state
            .send(
                seq,
                debug_event::Payload::Error(Error {
                    message: "request without payload".to_string(),
                }),
            )
            .await;
    };

    match payload {
        debug_request::Payload::ListFrames(req) => {
            if let Some(delay) = state.config.list_frames_delay {
                tokio::time::sleep(delay).await;
            }
            let frame = state.config.frames.get(&req.thread_id).cloned().unwrap_or_default();
            state
                .send(seq, debug_event::Payload::ListFrames(ListFramesResponse { frame }))
                .await
        }
        debug_request::Payload::StartDebugging(_) => {
            state
                .send(seq, debug_event::Payload::StartDebugging(StartDebuggingResponse {}))
                .await?;
            if let Some(thread) = state.config.initial_pause.clone() {
                state
                    .send(
                        0,
                        debug_event::Payload::ThreadPaused(ThreadPausedEvent {
                            thread: Some(thread),
                        }),
                    )
                    .await?;
            }
            Ok(())
        }
        debug_request::Payload::PauseThread(req) => {
            state
                .send(seq, debug_event::Payload::PauseThread(PauseThreadResponse {}))
                .await?;
            let id = match req.thread_id {
                0 => state.config.default_thread_id,
                id => id,
            };
            let thread = state.paused(id, PauseReason::PauseThreadRequest);
            state
                .send(
                    0,
                    debug_event::Payload::ThreadPaused(ThreadPausedEvent {
                        thread: Some(thread),
                    }),
                )
                .await
        }
        debug_request::Payload::ContinueExecution(req) => {
            state
                .send(
                    seq,
                    debug_event::Payload::ContinueExecution(ContinueExecutionResponse {}),
                )
                .await?;
            if state.config.continued_events {
                state
                    .send(
                        0,
                        debug_event::Payload::ThreadContinued(ThreadContinuedEvent {
                            thread_id: req.thread_id,
                        }),
                    )
                    .await?;
            }
            if state.config.pause_after_step && req.stepping() != Stepping::None {
                let thread = state.paused(req.thread_id, PauseReason::Stepping);
                state
                    .send(
                        0,
                        debug_event::Payload::ThreadPaused(ThreadPausedEvent {
                            thread: Some(thread),
                        }),
                    )
                    .await?;
            }
            Ok(())
        }
        debug_request::Payload::Evaluate(req) => {
            let reply = match state.config.evaluations.get(&req.statement) {
                Some(MockEvaluation::Value(value)) => {
                    debug_event::Payload::Evaluate(EvaluateResponse {
                        result: Some(value.clone()),
                    })
                }
                Some(MockEvaluation::Error(message)) => debug_event::Payload::Error(Error {
                    message: message.clone(),
                }),
                None => debug_event::Payload::Error(Error {
                    message: format!("name '{}' is not defined", req.statement),
                }),
            };
            state.send(seq, reply).await
        }
        debug_request::Payload::SetBreakpoints(req) => {
            *state.breakpoints.lock().await = req.breakpoint;
            state
                .send(seq, debug_event::Payload::SetBreakpoints(SetBreakpointsResponse {}))
                .await
        }
        debug_request::Payload::GetChildren(req) => {
            let children = state
                .config
                .children
                .get(&req.value_id)
                .cloned()
                .unwrap_or_default();
            state
                .send(
                    seq,
                    debug_event::Payload::GetChildren(GetChildrenResponse { children }),
                )
                .await
        }
    }
}
