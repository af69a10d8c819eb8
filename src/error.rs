use std::io;

/// Errors parsing or speaking the line-oriented wire protocol shared by the
/// tracker and the peer data plane. Call sites that spec requires to
/// swallow these (tracker client, filesize probe) convert them into
/// `false`/`0`/empty-vec rather than propagating.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed request line: {0:?}")]
    MalformedRequest(String),

    #[error("response was not a decimal byte count: {0:?}")]
    NotANumber(String),

    #[error("tracker did not answer OK")]
    NotOk,

    #[error("filename {0:?} is not a single path component")]
    UnsafeName(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
