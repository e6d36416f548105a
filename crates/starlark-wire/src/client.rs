use std::{
    collections::HashMap,
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::{broadcast, oneshot, watch},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use crate::{
    codec::{DelimitedCodec, MAX_FRAME_BYTES},
    error::{Result, WireError},
    poison::lock,
    proto::{
        debug_event, debug_request, Breakpoint, ContinueExecutionRequest, DebugEvent, DebugRequest,
        EvaluateRequest, Frame, GetChildrenRequest, ListFramesRequest, PauseThreadRequest,
        SetBreakpointsRequest, StartDebuggingRequest, Stepping, Value,
    },
    ThreadId,
};

/// Port the Starlark debug server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 7300;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Total number of connection attempts before giving up.
    pub connect_attempts: u32,
    /// Delay between two connection attempts.
    pub retry_delay: Duration,
    /// Per-request reply timeout. `None` waits forever.
    pub reply_timeout: Option<Duration>,
    pub event_channel_size: usize,
    pub max_frame_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_attempts: 5,
            retry_delay: Duration::from_secs(1),
            reply_timeout: None,
            event_channel_size: 256,
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Shut down explicitly, or the server closed the socket.
    Closed,
    /// Connecting gave up, or the connection broke with an error.
    Failed,
}

/// Notifications broadcast to every subscriber of a [`DebugClient`].
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A connection attempt failed; another one follows unless attempts ran out.
    ConnectFailed { attempt: u32, error: String },
    Connected,
    /// A server message with sequence number `0`.
    Debug(debug_event::Payload),
    /// The connection is gone. `error` is set when it broke rather than closed.
    Disconnected { error: Option<String> },
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type PendingReply = oneshot::Sender<Result<DebugEvent>>;

struct Inner {
    writer: tokio::sync::Mutex<Option<FramedWrite<BoxedWriter, DelimitedCodec<DebugEvent>>>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_seq: AtomicU64,
    events: broadcast::Sender<ClientEvent>,
    state: watch::Sender<ConnectionState>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    config: ClientConfig,
}

/// Async client for one debug server connection.
///
/// Cloning is cheap; all clones share the same connection, sequence counter and
/// pending-request table.
#[derive(Clone)]
pub struct DebugClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DebugClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugClient")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.connection_state())
            .finish()
    }
}

impl DebugClient {
    /// Create a client in the `Connecting` state. Nothing touches the network
    /// until [`DebugClient::connect`] is called, so callers can subscribe first.
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_size.max(1));
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            inner: Arc::new(Inner {
                writer: tokio::sync::Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(1),
                events,
                state,
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                config,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Watch connection state changes, e.g. to wait for the connection to end.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Connect over TCP to the configured host and port.
    pub async fn connect(&self) -> Result<()> {
        let host = self.inner.config.host.clone();
        let port = self.inner.config.port;
        self.connect_with(move || {
            let host = host.clone();
            async move {
                let stream = TcpStream::connect((host.as_str(), port)).await?;
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
        })
        .await
    }

    /// Connect using `connector` to open the byte stream, retrying failed
    /// attempts after `retry_delay` up to `connect_attempts` times.
    pub async fn connect_with<F, Fut, S>(&self, mut connector: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<S>>,
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let state = self.connection_state();
        if state != ConnectionState::Connecting {
            return Err(WireError::InvalidState(state));
        }

        let attempts = self.inner.config.connect_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            if self.inner.shutdown.is_cancelled() {
                return Err(WireError::ConnectionClosed);
            }

            match connector().await {
                Ok(stream) => {
                    self.attach(stream).await?;
                    tracing::info!(
                        target: "starlark.wire",
                        host = %self.inner.config.host,
                        port = self.inner.config.port,
                        attempt,
                        "connected to debug server"
                    );
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(
                        target: "starlark.wire",
                        host = %self.inner.config.host,
                        port = self.inner.config.port,
                        attempt,
                        attempts,
                        error = %err,
                        "failed to connect to debug server"
                    );
                    let _ = self.inner.events.send(ClientEvent::ConnectFailed {
                        attempt,
                        error: err.to_string(),
                    });
                    last_error = Some(err);
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = self.inner.shutdown.cancelled() => return Err(WireError::ConnectionClosed),
                    _ = tokio::time::sleep(self.inner.config.retry_delay) => {}
                }
            }
        }

        self.inner.state.send_replace(ConnectionState::Failed);
        Err(WireError::ConnectFailed {
            attempts,
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no connection attempt made")),
        })
    }

    async fn attach<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        let codec = DelimitedCodec::<DebugEvent>::with_max_frame_bytes(self.inner.config.max_frame_bytes);

        let writer: BoxedWriter = Box::new(write);
        *self.inner.writer.lock().await = Some(FramedWrite::new(writer, codec.clone()));

        // `shutdown` may have run while the stream was being opened; `close`
        // sets `closed` before it publishes the final state.
        let published = self.inner.state.send_if_modified(|state| {
            if self.inner.closed.load(Ordering::Acquire) || *state != ConnectionState::Connecting {
                return false;
            }
            *state = ConnectionState::Connected;
            true
        });
        if !published {
            let writer = self.inner.writer.lock().await.take();
            if let Some(mut writer) = writer {
                let _ = SinkExt::<DebugRequest>::close(&mut writer).await;
            }
            tracing::debug!(target: "starlark.wire", "connection opened after shutdown; dropping it");
            return Err(WireError::ConnectionClosed);
        }

        let reader: BoxedReader = Box::new(read);
        tokio::spawn(read_loop(FramedRead::new(reader, codec), self.inner.clone()));

        let _ = self.inner.events.send(ClientEvent::Connected);
        Ok(())
    }

    /// Close the connection. Every request still waiting for a reply fails
    /// with [`WireError::ConnectionClosed`].
    pub async fn shutdown(&self) {
        self.inner.close(None);
        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = SinkExt::<DebugRequest>::close(&mut writer).await;
        }
    }

    /// Send `payload` stamped with the next sequence number and wait for the
    /// response carrying the same number.
    ///
    /// An `Error` response is returned as [`WireError::Remote`].
    pub async fn send_request(&self, payload: debug_request::Payload) -> Result<debug_event::Payload> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(WireError::NotConnected);
        }

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let kind = payload.kind();
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending, "send_request").insert(seq, tx);

        tracing::trace!(target: "starlark.wire", seq, kind, "sending request");
        let request = DebugRequest {
            sequence_number: seq,
            payload: Some(payload),
        };
        {
            let mut writer = self.inner.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                self.remove_pending(seq);
                return Err(WireError::NotConnected);
            };
            if let Err(err) = writer.send(request).await {
                self.remove_pending(seq);
                return Err(err);
            }
        }

        let reply = match self.inner.config.reply_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(reply) => reply,
                Err(_elapsed) => {
                    self.remove_pending(seq);
                    return Err(WireError::Timeout);
                }
            },
            None => rx.await,
        };
        let event = reply.map_err(|_closed| WireError::ConnectionClosed)??;

        match event.payload {
            Some(debug_event::Payload::Error(err)) => Err(WireError::Remote(err.message)),
            Some(payload) => Ok(payload),
            None => Err(WireError::UnexpectedResponse {
                expected: kind,
                actual: "empty",
            }),
        }
    }

    fn remove_pending(&self, seq: u64) {
        lock(&self.inner.pending, "remove_pending").remove(&seq);
    }

    /// Replace the complete breakpoint set on the server.
    pub async fn set_breakpoints(&self, breakpoint: Vec<Breakpoint>) -> Result<()> {
        let payload = debug_request::Payload::SetBreakpoints(SetBreakpointsRequest { breakpoint });
        match self.send_request(payload).await? {
            debug_event::Payload::SetBreakpoints(_) => Ok(()),
            other => Err(unexpected("setBreakpoints", &other)),
        }
    }

    pub async fn continue_execution(&self, thread_id: ThreadId, stepping: Stepping) -> Result<()> {
        let payload = debug_request::Payload::ContinueExecution(ContinueExecutionRequest {
            thread_id,
            stepping: stepping as i32,
        });
        match self.send_request(payload).await? {
            debug_event::Payload::ContinueExecution(_) => Ok(()),
            other => Err(unexpected("continueExecution", &other)),
        }
    }

    pub async fn list_frames(&self, thread_id: ThreadId) -> Result<Vec<Frame>> {
        let payload = debug_request::Payload::ListFrames(ListFramesRequest { thread_id });
        match self.send_request(payload).await? {
            debug_event::Payload::ListFrames(resp) => Ok(resp.frame),
            other => Err(unexpected("listFrames", &other)),
        }
    }

    /// Evaluate `statement` in the innermost frame of `thread_id`.
    pub async fn evaluate(&self, thread_id: ThreadId, statement: &str) -> Result<Value> {
        let payload = debug_request::Payload::Evaluate(EvaluateRequest {
            thread_id,
            statement: statement.to_string(),
        });
        match self.send_request(payload).await? {
            debug_event::Payload::Evaluate(resp) => Ok(resp.result.unwrap_or_default()),
            other => Err(unexpected("evaluate", &other)),
        }
    }

    pub async fn get_children(&self, thread_id: ThreadId, value_id: i64) -> Result<Vec<Value>> {
        let payload =
            debug_request::Payload::GetChildren(GetChildrenRequest { thread_id, value_id });
        match self.send_request(payload).await? {
            debug_event::Payload::GetChildren(resp) => Ok(resp.children),
            other => Err(unexpected("getChildren", &other)),
        }
    }

    /// Pause `thread_id`, or every thread when it is `0`.
    pub async fn pause_thread(&self, thread_id: ThreadId) -> Result<()> {
        let payload = debug_request::Payload::PauseThread(PauseThreadRequest { thread_id });
        match self.send_request(payload).await? {
            debug_event::Payload::PauseThread(_) => Ok(()),
            other => Err(unexpected("pauseThread", &other)),
        }
    }

    pub async fn start_debugging(&self) -> Result<()> {
        let payload = debug_request::Payload::StartDebugging(StartDebuggingRequest {});
        match self.send_request(payload).await? {
            debug_event::Payload::StartDebugging(_) => Ok(()),
            other => Err(unexpected("startDebugging", &other)),
        }
    }
}

fn unexpected(expected: &'static str, actual: &debug_event::Payload) -> WireError {
    WireError::UnexpectedResponse {
        expected,
        actual: actual.kind(),
    }
}

impl Inner {
    /// Route one decoded server message.
    fn dispatch(&self, event: DebugEvent) {
        if event.sequence_number == 0 {
            match event.payload {
                Some(payload) => {
                    tracing::debug!(target: "starlark.wire", kind = payload.kind(), "received event");
                    let _ = self.events.send(ClientEvent::Debug(payload));
                }
                None => tracing::debug!(target: "starlark.wire", "ignoring event without payload"),
            }
            return;
        }

        let seq = event.sequence_number;
        let tx = lock(&self.pending, "dispatch").remove(&seq);
        match tx {
            Some(tx) => {
                let _ = tx.send(Ok(event));
            }
            None => {
                tracing::debug!(target: "starlark.wire", seq, "dropping response without a pending request");
            }
        }
    }

    fn close(&self, error: Option<String>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.cancel();
        self.state.send_replace(if error.is_some() {
            ConnectionState::Failed
        } else {
            ConnectionState::Closed
        });

        let pending = std::mem::take(&mut *lock(&self.pending, "close"));
        if !pending.is_empty() {
            tracing::debug!(target: "starlark.wire", count = pending.len(), "failing pending requests");
        }
        for (_seq, tx) in pending {
            let _ = tx.send(Err(WireError::ConnectionClosed));
        }

        let _ = self.events.send(ClientEvent::Disconnected { error });
    }
}

async fn read_loop(mut reader: FramedRead<BoxedReader, DelimitedCodec<DebugEvent>>, inner: Arc<Inner>) {
    let error = loop {
        let next = tokio::select! {
            _ = inner.shutdown.cancelled() => break None,
            next = reader.next() => next,
        };

        match next {
            Some(Ok(event)) => inner.dispatch(event),
            Some(Err(err)) => {
                tracing::error!(target: "starlark.wire", error = %err, "debug server connection failed");
                break Some(err.to_string());
            }
            None => {
                tracing::info!(target: "starlark.wire", "debug server closed the connection");
                break None;
            }
        }
    };

    inner.close(error);
}
