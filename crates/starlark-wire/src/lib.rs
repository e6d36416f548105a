//! Starlark debugging wire protocol client.
//!
//! The remote interpreter exposes its debugger over a plain TCP socket. Every
//! message in either direction is a protobuf message prefixed with its length
//! as a base-128 varint. Requests carry a non-zero sequence number that the
//! server echoes back on the matching response; messages with sequence number
//! `0` are unsolicited events (thread paused / continued).
//!
//! `starlark-dap` consumes this crate to translate Debug Adapter Protocol
//! requests into wire requests.

mod client;
mod codec;
mod error;
mod poison;
pub mod proto;

pub use client::{ClientConfig, ClientEvent, ConnectionState, DebugClient, DEFAULT_PORT};
pub use codec::{DelimitedCodec, MAX_FRAME_BYTES};
pub use error::{Result, WireError};
pub use proto::{
    debug_event, debug_request, Breakpoint, DebugEvent, DebugRequest, Frame, Location,
    PauseReason, PausedThread, Scope, Stepping, Value,
};

/// Thread identifier as reported by the debug server.
pub type ThreadId = i64;

// The mock server is only needed for tests and downstream integration suites.
// Compile it for this crate's own unit tests unconditionally (via `cfg(test)`),
// while keeping it behind the `test-support` feature for everyone else.
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

/// Decode every complete frame in `bytes`, stopping at the first error or at a
/// trailing partial frame.
///
/// Used by the fuzz targets; the client itself decodes incrementally through
/// [`DelimitedCodec`].
pub fn decode_event_frames(bytes: &[u8]) -> Result<Vec<DebugEvent>> {
    use tokio_util::codec::Decoder as _;

    let mut codec = DelimitedCodec::<DebugEvent>::new();
    let mut buf = bytes::BytesMut::from(bytes);
    let mut out = Vec::new();
    while let Some(event) = codec.decode(&mut buf)? {
        out.push(event);
    }
    Ok(out)
}
