use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use parking_lot::Mutex;
use serde::Serialize;
use starlark_wire::{
    debug_event, DebugClient, Frame, PauseReason, PausedThread, Scope, Stepping, ThreadId, Value,
    WireError,
};

use crate::{
    breakpoints::{SourceBreakpoint, SourceBreakpoints},
    error::{DebuggerError, Result},
    handles::HandleTable,
    source::{resolve_source_path, source_name},
};

#[derive(Debug, Clone)]
enum DebugObject {
    Frame(Frame),
    Scope(Scope),
    Value(Value),
}

#[derive(Debug, Default)]
struct SessionState {
    handles: HandleTable<DebugObject>,
    frame_threads: HashMap<i64, ThreadId>,
    scope_threads: HashMap<i64, ThreadId>,
    value_threads: HashMap<i64, ThreadId>,
    paused_threads: BTreeMap<ThreadId, PausedThread>,
    breakpoints: SourceBreakpoints,
    /// Bumped whenever references are invalidated. Wire replies that started
    /// in an older epoch must not register new handles.
    epoch: u64,
}

impl SessionState {
    /// References are only valid while the debuggee stays paused.
    fn clear_handles(&mut self) {
        self.epoch += 1;
        self.handles.clear();
        self.frame_threads.clear();
        self.scope_threads.clear();
        self.value_threads.clear();
    }

    fn variable(&mut self, value: &Value, thread_id: ThreadId) -> Variable {
        let variables_reference = if value.has_children && value.id != 0 {
            let reference = self.handles.create(DebugObject::Value(value.clone()));
            self.value_threads.insert(reference, thread_id);
            reference
        } else {
            0
        };
        Variable {
            name: value.label.clone(),
            value: value.description.clone(),
            type_name: non_empty(&value.r#type),
            variables_reference,
        }
    }

    /// Like [`SessionState::variable`], but never registers a handle for a
    /// reply that outlived the pause it was requested in.
    fn variable_in(&mut self, value: &Value, thread_id: ThreadId, epoch: u64) -> Variable {
        if self.epoch == epoch {
            return self.variable(value, thread_id);
        }
        Variable {
            name: value.label.clone(),
            value: value.description.clone(),
            type_name: non_empty(&value.r#type),
            variables_reference: 0,
        }
    }

    /// Best-effort lookup of an already fetched value whose label matches
    /// `label` on `thread_id`.
    fn find_value(&self, thread_id: ThreadId, label: &str) -> Option<(i64, Value)> {
        let registered = self
            .handles
            .iter()
            .filter(|(reference, _)| self.value_threads.get(reference) == Some(&thread_id))
            .filter_map(|(reference, object)| match object {
                DebugObject::Value(value) if value.label == label => Some((reference, value)),
                _ => None,
            })
            .min_by_key(|(reference, _)| *reference);
        if let Some((reference, value)) = registered {
            return Some((reference, value.clone()));
        }

        self.handles
            .iter()
            .filter(|(reference, _)| self.scope_threads.get(reference) == Some(&thread_id))
            .filter_map(|(reference, object)| match object {
                DebugObject::Scope(scope) => scope
                    .binding
                    .iter()
                    .find(|binding| binding.label == label)
                    .map(|binding| (reference, binding)),
                _ => None,
            })
            .min_by_key(|(reference, _)| *reference)
            .map(|(_, value)| (0, value.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    pub line: i32,
    pub column: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeInfo {
    pub name: String,
    pub variables_reference: i64,
    pub expensive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub variables_reference: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub variables_reference: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakpointResult {
    pub verified: bool,
    pub line: i32,
}

/// UI notifications produced by a debug server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Thread {
        thread_id: ThreadId,
        reason: &'static str,
    },
    Stopped {
        thread_id: ThreadId,
        reason: &'static str,
        description: String,
        text: Option<String>,
    },
    Continued {
        thread_id: ThreadId,
    },
}

/// DAP `stopped` reason, description and optional detail text for a pause.
pub fn stop_reason(thread: &PausedThread) -> (&'static str, String, Option<String>) {
    match thread.pause_reason() {
        PauseReason::Stepping => ("step", "Paused after step".to_string(), None),
        PauseReason::AllThreadsPaused => ("pause", "Paused".to_string(), None),
        PauseReason::PauseThreadRequest => ("pause", "Paused on request".to_string(), None),
        PauseReason::HitBreakpoint => ("breakpoint", "Paused on breakpoint".to_string(), None),
        PauseReason::ConditionalBreakpointError => {
            let message = thread
                .conditional_breakpoint_error
                .as_ref()
                .map(|err| err.message.clone())
                .unwrap_or_default();
            (
                "exception",
                format!("Error evaluating breakpoint condition: {message}"),
                Some(message),
            )
        }
        PauseReason::Initializing => ("entry", "Paused on entry".to_string(), None),
        PauseReason::Unset => ("pause", "Paused".to_string(), None),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Strip one pair of matching surrounding quotes, as editors send them for
/// hovered string literals.
fn trim_quotes(expression: &str) -> &str {
    let trimmed = expression.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    trimmed
}

/// One debugging session against a connected debug server.
///
/// All methods take `&self`; the session state lock is never held across a
/// wire call, so requests from the client can interleave freely.
pub struct Debugger {
    client: DebugClient,
    workspace_root: Option<PathBuf>,
    state: Mutex<SessionState>,
    /// Held from snapshotting the breakpoint set until the server acknowledged
    /// it, so the last update to reach the wire is the most complete one.
    breakpoint_sync: tokio::sync::Mutex<()>,
}

impl Debugger {
    pub fn new(client: DebugClient, workspace_root: Option<PathBuf>) -> Self {
        Self {
            client,
            workspace_root,
            state: Mutex::new(SessionState::default()),
            breakpoint_sync: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the breakpoints of `path` and send the complete set to the server.
    pub async fn set_breakpoints(
        &self,
        path: &str,
        breakpoints: Vec<SourceBreakpoint>,
    ) -> Result<Vec<BreakpointResult>> {
        let results = breakpoints
            .iter()
            .map(|bp| BreakpointResult {
                verified: true,
                line: bp.line,
            })
            .collect();
        let _sync = self.breakpoint_sync.lock().await;
        let wire = {
            let mut state = self.state.lock();
            state.breakpoints.set(path, breakpoints);
            state.breakpoints.to_wire()
        };
        tracing::debug!(
            target: "starlark.dap",
            path,
            total = wire.len(),
            "sending breakpoints"
        );
        self.client.set_breakpoints(wire).await?;
        Ok(results)
    }

    pub fn threads(&self) -> Vec<Thread> {
        let state = self.state.lock();
        state
            .paused_threads
            .values()
            .map(|thread| Thread {
                id: thread.id,
                name: if thread.name.is_empty() {
                    format!("Thread {}", thread.id)
                } else {
                    thread.name.clone()
                },
            })
            .collect()
    }

    pub async fn stack_trace(&self, thread_id: ThreadId) -> Result<Vec<StackFrame>> {
        let epoch = self.state.lock().epoch;
        let frames = self.client.list_frames(thread_id).await?;

        let sources: Vec<Option<Source>> = frames
            .iter()
            .map(|frame| {
                frame.location.as_ref().map(|loc| {
                    let path = resolve_source_path(&loc.path, self.workspace_root.as_deref());
                    Source {
                        name: source_name(&path),
                        path: path.to_string_lossy().into_owned(),
                    }
                })
            })
            .collect();

        let mut state = self.state.lock();
        if state.epoch != epoch {
            tracing::debug!(target: "starlark.dap", thread_id, "thread resumed while listing frames");
            return Ok(Vec::new());
        }
        Ok(frames
            .into_iter()
            .zip(sources)
            .map(|(frame, source)| {
                let (line, column) = frame
                    .location
                    .as_ref()
                    .map(|loc| (loc.line_number, loc.column_number))
                    .unwrap_or((0, 0));
                let name = frame.function_name.clone();
                let id = state.handles.create(DebugObject::Frame(frame));
                state.frame_threads.insert(id, thread_id);
                StackFrame {
                    id,
                    name,
                    line,
                    column,
                    source,
                }
            })
            .collect())
    }

    /// Scopes come from the already fetched frame; no wire call is made.
    pub fn scopes(&self, frame_id: i64) -> Vec<ScopeInfo> {
        let mut state = self.state.lock();
        let Some(DebugObject::Frame(frame)) = state.handles.get(frame_id).cloned() else {
            return Vec::new();
        };
        let Some(&thread_id) = state.frame_threads.get(&frame_id) else {
            return Vec::new();
        };

        frame
            .scope
            .into_iter()
            .map(|scope| {
                let name = scope.name.clone();
                let variables_reference = state.handles.create(DebugObject::Scope(scope));
                state.scope_threads.insert(variables_reference, thread_id);
                ScopeInfo {
                    name,
                    variables_reference,
                    expensive: false,
                }
            })
            .collect()
    }

    /// Bindings of a scope, or the children of an expandable value.
    ///
    /// Unknown or stale references yield an empty list.
    pub async fn variables(&self, reference: i64) -> Result<Vec<Variable>> {
        let (thread_id, value_id, epoch) = {
            let mut state = self.state.lock();
            match state.handles.get(reference).cloned() {
                Some(DebugObject::Scope(scope)) => {
                    let Some(&thread_id) = state.scope_threads.get(&reference) else {
                        return Ok(Vec::new());
                    };
                    return Ok(scope
                        .binding
                        .iter()
                        .map(|value| state.variable(value, thread_id))
                        .collect());
                }
                Some(DebugObject::Value(value)) => {
                    let Some(&thread_id) = state.value_threads.get(&reference) else {
                        return Ok(Vec::new());
                    };
                    (thread_id, value.id, state.epoch)
                }
                Some(DebugObject::Frame(_)) | None => return Ok(Vec::new()),
            }
        };

        let children = self.client.get_children(thread_id, value_id).await?;
        let mut state = self.state.lock();
        if state.epoch != epoch {
            return Ok(Vec::new());
        }
        Ok(children
            .iter()
            .map(|value| state.variable(value, thread_id))
            .collect())
    }

    pub async fn evaluate(&self, frame_id: i64, expression: &str) -> Result<EvaluateResult> {
        let expression = trim_quotes(expression);
        let (thread_id, epoch) = {
            let state = self.state.lock();
            let thread_id = state.frame_threads.get(&frame_id).copied().ok_or_else(|| {
                DebuggerError::InvalidRequest(format!("unknown frameId {frame_id}"))
            })?;
            (thread_id, state.epoch)
        };

        match self.client.evaluate(thread_id, expression).await {
            Ok(value) => {
                let variable = self.state.lock().variable_in(&value, thread_id, epoch);
                Ok(EvaluateResult {
                    result: variable.value,
                    type_name: variable.type_name,
                    variables_reference: variable.variables_reference,
                })
            }
            Err(WireError::Remote(message)) => {
                let mut state = self.state.lock();
                let found = if state.epoch == epoch {
                    state.find_value(thread_id, expression)
                } else {
                    None
                };
                let Some((reference, value)) = found else {
                    tracing::debug!(
                        target: "starlark.dap",
                        expression,
                        error = %message,
                        "evaluation failed"
                    );
                    return Ok(EvaluateResult {
                        result: message,
                        type_name: None,
                        variables_reference: 0,
                    });
                };
                let variables_reference = if reference != 0 {
                    reference
                } else {
                    state.variable(&value, thread_id).variables_reference
                };
                Ok(EvaluateResult {
                    result: value.description,
                    type_name: non_empty(&value.r#type),
                    variables_reference,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Continue or step `thread_id`. Every outstanding reference is dropped
    /// before the request goes out.
    pub async fn resume(&self, thread_id: ThreadId, stepping: Stepping) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.clear_handles();
            state.paused_threads.remove(&thread_id);
        }
        self.client.continue_execution(thread_id, stepping).await?;
        Ok(())
    }

    pub async fn pause(&self, thread_id: ThreadId) -> Result<()> {
        self.client.pause_thread(thread_id).await?;
        Ok(())
    }

    pub async fn configuration_done(&self) -> Result<()> {
        self.client.start_debugging().await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.client.shutdown().await;
    }

    /// Apply an unsolicited debug server event and return the UI notifications
    /// it produces. Unknown payloads are ignored.
    pub fn handle_event(&self, payload: &debug_event::Payload) -> Vec<SessionEvent> {
        match payload {
            debug_event::Payload::ThreadPaused(event) => {
                let Some(thread) = event.thread.clone() else {
                    return Vec::new();
                };
                let thread_id = thread.id;
                let (reason, description, text) = stop_reason(&thread);
                tracing::debug!(target: "starlark.dap", thread_id, reason, "thread paused");
                self.state.lock().paused_threads.insert(thread_id, thread);
                vec![
                    SessionEvent::Thread {
                        thread_id,
                        reason: "started",
                    },
                    SessionEvent::Stopped {
                        thread_id,
                        reason,
                        description,
                        text,
                    },
                ]
            }
            debug_event::Payload::ThreadContinued(event) => {
                tracing::debug!(target: "starlark.dap", thread_id = event.thread_id, "thread continued");
                self.state.lock().paused_threads.remove(&event.thread_id);
                vec![SessionEvent::Continued {
                    thread_id: event.thread_id,
                }]
            }
            other => {
                tracing::debug!(target: "starlark.dap", kind = other.kind(), "ignoring debug event");
                Vec::new()
            }
        }
    }
}
