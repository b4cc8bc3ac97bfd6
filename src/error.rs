use thiserror::Error;

/// Failures of the device session layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The device rejected the local credentials. Never retried.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Network or framing failure. Retried with backoff.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("no configured device '{0}'")]
    UnknownDevice(String),
}

impl SessionError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        SessionError::Transport(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Transport(err.to_string())
    }
}

/// A payload that could not be turned into a telemetry sample.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unrecognized payload: {0}")]
    UnrecognizedPayload(String),
}
