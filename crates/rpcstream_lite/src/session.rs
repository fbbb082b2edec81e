use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::channel::{self, Receiver, Sender, Terminal, Terminate};
use crate::error::Status;
use crate::shape::Shape;

/// Unique identifier of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a session. Only `Open` is non-terminal and terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Open,
    Completed,
    Failed,
    Canceled,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Open)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Open => "OPEN",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

/// Both ends of one session channel.
pub type ChannelPair = (Sender<Bytes>, Receiver<Bytes>);

/// A freshly opened session together with the channels its shape requires.
pub struct OpenSession {
    pub session: Session,
    /// Caller to handler. Present for client and bidi streaming.
    pub inbound: Option<ChannelPair>,
    /// Handler to caller. Present for server and bidi streaming.
    pub outbound: Option<ChannelPair>,
}

struct State {
    status: SessionStatus,
    error: Option<Status>,
}

struct Inner {
    id: SessionId,
    method: String,
    shape: Shape,
    deadline: Option<Instant>,
    state: Mutex<State>,
    // Raised before the state lock is taken so a racing `complete` yields to it.
    cancel_requested: AtomicBool,
    channels: Vec<Arc<dyn Terminate>>,
    cancelled: CancellationToken,
    finished: CancellationToken,
}

/// One instance of an interaction shape: its channels, status and deadline.
///
/// Cloning is cheap; all clones observe and drive the same lifecycle.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Open a session in the `Open` state with the channels `shape` needs.
    ///
    /// The deadline is recorded as an absolute instant; arming the timer is the job of
    /// [`crate::deadline::attach`].
    pub fn open(
        shape: Shape,
        method: impl Into<String>,
        deadline: Option<Duration>,
        channel_capacity: usize,
    ) -> OpenSession {
        let inbound = shape
            .has_inbound()
            .then(|| channel::channel::<Bytes>(channel_capacity));
        let outbound = shape
            .has_outbound()
            .then(|| channel::channel::<Bytes>(channel_capacity));

        let channels = inbound
            .iter()
            .chain(outbound.iter())
            .map(|(sender, _)| sender.terminator())
            .collect();

        let session = Session {
            inner: Arc::new(Inner {
                id: SessionId::new(),
                method: method.into(),
                shape,
                deadline: deadline.map(|d| Instant::now() + d),
                state: Mutex::new(State {
                    status: SessionStatus::Open,
                    error: None,
                }),
                cancel_requested: AtomicBool::new(false),
                channels,
                cancelled: CancellationToken::new(),
                finished: CancellationToken::new(),
            }),
        };

        debug!(
            session_id = %session.id(),
            method = %session.method(),
            shape = %shape,
            "Session opened"
        );

        OpenSession {
            session,
            inbound,
            outbound,
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn shape(&self) -> Shape {
        self.inner.shape
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    pub fn is_open(&self) -> bool {
        !self.status().is_terminal()
    }

    /// The failure or cancellation reason, once the session is `Failed` or `Canceled`.
    pub fn error(&self) -> Option<Status> {
        self.inner.state.lock().error.clone()
    }

    /// The recorded failure, falling back to a plain cancellation.
    pub(crate) fn abort_reason(&self) -> Status {
        self.error()
            .unwrap_or_else(|| Status::canceled("session canceled"))
    }

    /// Finish the session.
    ///
    /// `Ok` closes every still-open channel normally; `Err` closes them with the error
    /// and marks the session `Failed`. Has no effect once the session is terminal or a
    /// cancellation is in flight. Returns the status the session ends up in.
    pub fn complete(&self, outcome: Result<(), Status>) -> SessionStatus {
        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return state.status;
        }
        if self.inner.cancel_requested.load(Ordering::SeqCst) {
            return SessionStatus::Canceled;
        }

        let terminal = match outcome {
            Ok(()) => {
                state.status = SessionStatus::Completed;
                Terminal::End
            }
            Err(status) => {
                state.status = SessionStatus::Failed;
                state.error = Some(status.clone());
                Terminal::Error(status)
            }
        };
        for channel in &self.inner.channels {
            channel.terminate(terminal.clone());
        }
        let status = state.status;
        drop(state);

        self.inner.finished.cancel();
        debug!(
            session_id = %self.id(),
            method = %self.method(),
            status = %status,
            "Session completed"
        );
        status
    }

    /// Abort the session. Any participant may call this.
    ///
    /// Wins against a concurrent [`Session::complete`]. Returns false when the session
    /// had already reached a terminal state, in which case nothing changes.
    pub fn cancel(&self, reason: Status) -> bool {
        self.inner.cancel_requested.store(true, Ordering::SeqCst);

        let mut state = self.inner.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.status = SessionStatus::Canceled;
        state.error = Some(reason.clone());
        for channel in &self.inner.channels {
            channel.terminate(Terminal::Canceled(reason.clone()));
        }
        drop(state);

        self.inner.cancelled.cancel();
        self.inner.finished.cancel();
        debug!(
            session_id = %self.id(),
            method = %self.method(),
            reason = %reason,
            "Session canceled"
        );
        true
    }

    /// Resolves once the session is canceled.
    pub async fn cancelled(&self) {
        self.inner.cancelled.cancelled().await;
    }

    /// Resolves once the session reaches any terminal state.
    pub async fn finished(&self) {
        self.inner.finished.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.is_cancelled()
    }

    /// A token that fires when the session is canceled. Cancelling it does not cancel
    /// the session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancelled.child_token()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("shape", &self.inner.shape)
            .field("status", &self.status())
            .finish()
    }
}
