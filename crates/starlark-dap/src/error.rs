use starlark_wire::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DebuggerError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, DebuggerError>;
