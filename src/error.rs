use super::session::State;

use thiserror::Error;

use std::collections::TryReserveError;
use std::io;

/// Everything that can go wrong while driving a FastCGI request.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket creation or connect failed. The session stays unconnected.
    #[error("failed to connect to FastCGI server: {0}")]
    Connect(#[source] io::Error),

    /// A record could not be written in full.
    #[error("failed to write record: {0}")]
    Write(#[source] io::Error),

    /// The response stream failed, or ended in the middle of a record.
    #[error("failed to read response: {0}")]
    Read(#[source] io::Error),

    #[error("failed to allocate record buffer: {0}")]
    Allocation(#[from] TryReserveError),

    /// Content or a name-value field is longer than its length field can express.
    #[error("{0} bytes is too long to encode")]
    TooLong(usize),

    /// The server sent something that is not valid FastCGI.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("cannot {operation} in state {state:?}")]
    State {
        operation: &'static str,
        state: State,
    },

    #[error("session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
