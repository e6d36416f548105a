use std::io;

use thiserror::Error;

use crate::client::ConnectionState;

#[derive(Debug, Error)]
pub enum WireError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("wire protocol error: {0}")]
    Protocol(String),

    #[error("failed to connect to debug server after {attempts} attempt(s): {source}")]
    ConnectFailed {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("debug client is not connected")]
    NotConnected,

    #[error("debug client cannot connect from state {0:?}")]
    InvalidState(ConnectionState),

    #[error("debug server connection closed")]
    ConnectionClosed,

    #[error("timed out waiting for debug server reply")]
    Timeout,

    /// The server answered the request with an `Error` payload.
    #[error("{0}")]
    Remote(String),

    #[error("expected {expected} response, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
}

pub type Result<T, E = WireError> = std::result::Result<T, E>;
