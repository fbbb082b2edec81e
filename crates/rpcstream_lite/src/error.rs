use std::fmt;

use thiserror::Error;

use crate::session::SessionId;
use crate::shape::Shape;

/// Failure classes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Code {
    /// A computation rejected its input.
    InvalidArgument,
    /// The deadline attached to the session fired.
    DeadlineExceeded,
    /// The caller or the handler aborted the session.
    Canceled,
    /// Unexpected fault inside a computation, or misuse of a channel.
    Internal,
    /// The transport underneath the session failed.
    Transport,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::Canceled => "CANCELED",
            Code::Internal => "INTERNAL",
            Code::Transport => "TRANSPORT",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure attached to a session and surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(Code::Transport, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for the two codes that mean the session was aborted rather than failed.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.code, Code::Canceled | Code::DeadlineExceeded)
    }
}

impl From<Status> for tonic::Status {
    fn from(status: Status) -> Self {
        let code = match status.code {
            Code::InvalidArgument => tonic::Code::InvalidArgument,
            Code::DeadlineExceeded => tonic::Code::DeadlineExceeded,
            Code::Canceled => tonic::Code::Cancelled,
            Code::Internal => tonic::Code::Internal,
            Code::Transport => tonic::Code::Unavailable,
        };
        tonic::Status::new(code, status.message)
    }
}

impl From<tonic::Status> for Status {
    fn from(status: tonic::Status) -> Self {
        let code = match status.code() {
            tonic::Code::InvalidArgument => Code::InvalidArgument,
            tonic::Code::DeadlineExceeded => Code::DeadlineExceeded,
            tonic::Code::Cancelled => Code::Canceled,
            tonic::Code::Unavailable => Code::Transport,
            _ => Code::Internal,
        };
        Status::new(code, status.message())
    }
}

/// Errors that can occur while parsing method paths.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcPathError {
    #[error("invalid method path: {0}")]
    Invalid(String),
}

/// Errors raised by the handler registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The method name is not a valid `package.Service/Method` path.
    #[error(transparent)]
    Path(#[from] RpcPathError),

    /// A handler is already registered under this method.
    #[error("handler already registered for '{0}'")]
    DuplicateHandler(String),

    /// No handler registered for the given method.
    #[error("no handler registered for '{0}'")]
    NoHandler(String),

    /// The method exists but serves a different interaction shape.
    #[error("'{method}' is a {registered} method, called as {requested}")]
    ShapeMismatch {
        method: String,
        registered: Shape,
        requested: Shape,
    },
}

/// Errors raised while tracking open sessions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// A session with this id is already being tracked.
    #[error("session {0} is already active")]
    AlreadyActive(SessionId),
}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        Status::internal(err.to_string())
    }
}

impl From<SessionError> for Status {
    fn from(err: SessionError) -> Self {
        Status::internal(err.to_string())
    }
}
