//! Debug Adapter Protocol bridge for the Starlark debug server.
//!
//! The adapter speaks DAP over stdio to the editor and the Starlark debugging
//! wire protocol (see `starlark-wire`) to the interpreter. [`session::Debugger`]
//! owns the translation state: paused threads, the per-source breakpoint set,
//! and the integer references handed out for frames, scopes and values.

pub mod breakpoints;
pub mod dap_tokio;
pub mod error;
pub mod handles;
pub mod launch;
pub mod server;
pub mod session;
pub mod source;

pub use crate::error::{DebuggerError, Result};
pub use crate::handles::HandleTable;
pub use crate::session::{Debugger, SessionEvent};
