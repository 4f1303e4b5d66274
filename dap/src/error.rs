use thiserror::Error;

/// Protocol-level faults: a malformed frame, a missing header, or a command
/// this session has no handler for. Mapped to `success:false` responses —
/// see spec §7, "DAP protocol errors".
#[derive(Debug, Error)]
pub enum DapError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl From<std::io::Error> for DapError {
    fn from(err: std::io::Error) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}

impl Clone for DapError {
    fn clone(&self) -> Self {
        match self {
            Self::MalformedFrame(s) => Self::MalformedFrame(s.clone()),
            Self::MissingContentLength => Self::MissingContentLength,
            Self::UnknownCommand(s) => Self::UnknownCommand(s.clone()),
        }
    }
}
