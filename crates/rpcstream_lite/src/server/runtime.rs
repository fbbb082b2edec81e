use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Status;
use crate::server::handler::{Call, ErasedHandler, HandlerContext};
use crate::session::{Session, SessionStatus};

/// Runs computations against sessions.
///
/// Every invocation ends in exactly one `complete` on its session when the
/// computation returns, fails or panics. A canceled computation that keeps awaiting
/// is aborted after the grace period. Abort only takes effect at an `.await`, so
/// long synchronous work has to check [`HandlerContext::check`] and yield itself.
#[derive(Debug, Clone)]
pub struct Runtime {
    cancel_grace: Duration,
}

impl Runtime {
    /// `cancel_grace` bounds how long a canceled computation may keep running.
    pub fn new(cancel_grace: Duration) -> Self {
        Self { cancel_grace }
    }

    /// Spawn the computation. The handle yields the encoded final reply, if the
    /// shape has one, or the status the session ended with.
    pub(crate) fn invoke(
        &self,
        session: Session,
        handler: Arc<dyn ErasedHandler>,
        call: Call,
    ) -> JoinHandle<Result<Option<Bytes>, Status>> {
        let grace = self.cancel_grace;

        tokio::spawn(async move {
            let ctx = HandlerContext::new(session.clone());
            let mut task = tokio::spawn(handler.call(ctx, call));

            let joined = tokio::select! {
                joined = &mut task => joined,
                _ = grace_elapsed(&session, grace) => {
                    warn!(
                        session_id = %session.id(),
                        method = %session.method(),
                        grace_ms = grace.as_millis() as u64,
                        "Handler ignored cancellation, aborting"
                    );
                    task.abort();
                    Ok(Err(session.abort_reason()))
                }
            };

            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    warn!(
                        session_id = %session.id(),
                        method = %session.method(),
                        "Handler panicked"
                    );
                    Err(Status::internal("handler panicked"))
                }
                Err(e) => Err(Status::internal(format!("handler task failed: {e}"))),
            };

            let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
            let status = session.complete(outcome);
            debug!(
                session_id = %session.id(),
                method = %session.method(),
                status = %status,
                "Handler finished"
            );

            match status {
                SessionStatus::Completed => result,
                SessionStatus::Failed => Err(session
                    .error()
                    .unwrap_or_else(|| Status::internal("session failed"))),
                SessionStatus::Canceled => {
                    // A cancel may still be recording its reason.
                    session.cancelled().await;
                    Err(session.abort_reason())
                }
                SessionStatus::Open => Err(Status::internal("session still open after completion")),
            }
        })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

async fn grace_elapsed(session: &Session, grace: Duration) {
    session.cancelled().await;
    tokio::time::sleep(grace).await;
}
