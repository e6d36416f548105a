//! Protobuf messages of the Starlark debugging protocol.
//!
//! Field tags match the debug server's `starlark_debugging.proto`; the types
//! are declared by hand with `prost` derives so no code generation step is
//! needed at build time.

/// A request from the debugger client to the debug server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugRequest {
    /// Echoed back by the server on the response. Never `0`.
    #[prost(uint64, tag = "1")]
    pub sequence_number: u64,
    #[prost(
        oneof = "debug_request::Payload",
        tags = "101, 102, 103, 104, 105, 106, 107"
    )]
    pub payload: ::core::option::Option<debug_request::Payload>,
}

pub mod debug_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "101")]
        ListFrames(super::ListFramesRequest),
        #[prost(message, tag = "102")]
        StartDebugging(super::StartDebuggingRequest),
        #[prost(message, tag = "103")]
        PauseThread(super::PauseThreadRequest),
        #[prost(message, tag = "104")]
        ContinueExecution(super::ContinueExecutionRequest),
        #[prost(message, tag = "105")]
        Evaluate(super::EvaluateRequest),
        #[prost(message, tag = "106")]
        SetBreakpoints(super::SetBreakpointsRequest),
        #[prost(message, tag = "107")]
        GetChildren(super::GetChildrenRequest),
    }

    impl Payload {
        pub fn kind(&self) -> &'static str {
            match self {
                Self::ListFrames(_) => "listFrames",
                Self::StartDebugging(_) => "startDebugging",
                Self::PauseThread(_) => "pauseThread",
                Self::ContinueExecution(_) => "continueExecution",
                Self::Evaluate(_) => "evaluate",
                Self::SetBreakpoints(_) => "setBreakpoints",
                Self::GetChildren(_) => "getChildren",
            }
        }
    }
}

/// A response or an asynchronous event sent by the debug server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DebugEvent {
    /// Sequence number of the request this responds to, or `0` for events.
    #[prost(uint64, tag = "1")]
    pub sequence_number: u64,
    #[prost(
        oneof = "debug_event::Payload",
        tags = "99, 101, 102, 103, 104, 105, 106, 107, 1001, 1002"
    )]
    pub payload: ::core::option::Option<debug_event::Payload>,
}

pub mod debug_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "99")]
        Error(super::Error),
        #[prost(message, tag = "101")]
        ListFrames(super::ListFramesResponse),
        #[prost(message, tag = "102")]
        StartDebugging(super::StartDebuggingResponse),
        #[prost(message, tag = "103")]
        PauseThread(super::PauseThreadResponse),
        #[prost(message, tag = "104")]
        ContinueExecution(super::ContinueExecutionResponse),
        #[prost(message, tag = "105")]
        Evaluate(super::EvaluateResponse),
        #[prost(message, tag = "106")]
        SetBreakpoints(super::SetBreakpointsResponse),
        #[prost(message, tag = "107")]
        GetChildren(super::GetChildrenResponse),
        #[prost(message, tag = "1001")]
        ThreadPaused(super::ThreadPausedEvent),
        #[prost(message, tag = "1002")]
        ThreadContinued(super::ThreadContinuedEvent),
    }

    impl Payload {
        pub fn kind(&self) -> &'static str {
            match self {
                Self::Error(_) => "error",
                Self::ListFrames(_) => "listFrames",
                Self::StartDebugging(_) => "startDebugging",
                Self::PauseThread(_) => "pauseThread",
                Self::ContinueExecution(_) => "continueExecution",
                Self::Evaluate(_) => "evaluate",
                Self::SetBreakpoints(_) => "setBreakpoints",
                Self::GetChildren(_) => "getChildren",
                Self::ThreadPaused(_) => "threadPaused",
                Self::ThreadContinued(_) => "threadContinued",
            }
        }
    }
}

/// Replaces the complete set of breakpoints known to the server.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetBreakpointsRequest {
    #[prost(message, repeated, tag = "1")]
    pub breakpoint: ::prost::alloc::vec::Vec<Breakpoint>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContinueExecutionRequest {
    #[prost(int64, tag = "1")]
    pub thread_id: i64,
    #[prost(enumeration = "Stepping", tag = "2")]
    pub stepping: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluateRequest {
    #[prost(int64, tag = "1")]
    pub thread_id: i64,
    #[prost(string, tag = "2")]
    pub statement: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListFramesRequest {
    #[prost(int64, tag = "1")]
    pub thread_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartDebuggingRequest {}

/// `thread_id == 0` pauses every thread.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PauseThreadRequest {
    #[prost(int64, tag = "1")]
    pub thread_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetChildrenRequest {
    #[prost(int64, tag = "1")]
    pub thread_id: i64,
    #[prost(int64, tag = "2")]
    pub value_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetBreakpointsResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContinueExecutionResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluateResponse {
    #[prost(message, optional, tag = "1")]
    pub result: ::core::option::Option<Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListFramesResponse {
    #[prost(message, repeated, tag = "1")]
    pub frame: ::prost::alloc::vec::Vec<Frame>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartDebuggingResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PauseThreadResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetChildrenResponse {
    #[prost(message, repeated, tag = "1")]
    pub children: ::prost::alloc::vec::Vec<Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadPausedEvent {
    #[prost(message, optional, tag = "1")]
    pub thread: ::core::option::Option<PausedThread>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadContinuedEvent {
    #[prost(int64, tag = "1")]
    pub thread_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Breakpoint {
    /// Optional condition; the breakpoint only fires when it evaluates truthy.
    #[prost(string, tag = "2")]
    pub expression: ::prost::alloc::string::String,
    #[prost(oneof = "breakpoint::Kind", tags = "1")]
    pub kind: ::core::option::Option<breakpoint::Kind>,
}

pub mod breakpoint {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Location(super::Location),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PausedThread {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(enumeration = "PauseReason", tag = "3")]
    pub pause_reason: i32,
    #[prost(message, optional, tag = "4")]
    pub location: ::core::option::Option<Location>,
    /// Set when `pause_reason` is `ConditionalBreakpointError`.
    #[prost(message, optional, tag = "5")]
    pub conditional_breakpoint_error: ::core::option::Option<Error>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Location {
    #[prost(int32, tag = "1")]
    pub line_number: i32,
    #[prost(string, tag = "2")]
    pub path: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub column_number: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Frame {
    #[prost(string, tag = "1")]
    pub function_name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub scope: ::prost::alloc::vec::Vec<Scope>,
    #[prost(message, optional, tag = "3")]
    pub location: ::core::option::Option<Location>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Scope {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub binding: ::prost::alloc::vec::Vec<Value>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(string, tag = "1")]
    pub label: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub description: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(bool, tag = "4")]
    pub has_children: bool,
    /// Server-side handle used with `GetChildrenRequest`; `0` when unset.
    #[prost(int64, tag = "5")]
    pub id: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PauseReason {
    Unset = 0,
    Stepping = 1,
    AllThreadsPaused = 2,
    PauseThreadRequest = 3,
    HitBreakpoint = 4,
    ConditionalBreakpointError = 5,
    Initializing = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Stepping {
    None = 0,
    Into = 1,
    Over = 2,
    Out = 3,
}
