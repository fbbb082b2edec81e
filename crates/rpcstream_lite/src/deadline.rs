//! Deadline enforcement for sessions.
//!
//! A session records its expiry when it is opened. [`attach`] arms a timer task
//! that cancels the session with `DEADLINE_EXCEEDED` once the expiry passes. The
//! task exits on its own when the session finishes first, and the returned guard
//! disarms it early when dropped.

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::error::Status;
use crate::session::Session;

/// Keeps a deadline armed. Dropping it disarms the timer.
#[derive(Debug)]
pub struct DeadlineGuard {
    _disarm: DropGuard,
}

/// Arm the session's deadline. Returns `None` when the session has no deadline.
pub fn attach(session: &Session) -> Option<DeadlineGuard> {
    let expires_at = session.deadline()?;
    let disarm = CancellationToken::new();
    let disarmed = disarm.clone();
    let session = session.clone();

    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = disarmed.cancelled() => {
                trace!(session_id = %session.id(), "Deadline disarmed");
            }
            _ = session.finished() => {}
            _ = tokio::time::sleep_until(expires_at) => {
                if session.cancel(Status::deadline_exceeded(format!(
                    "deadline exceeded for '{}'",
                    session.method()
                ))) {
                    debug!(
                        session_id = %session.id(),
                        method = %session.method(),
                        "Deadline fired, session canceled"
                    );
                }
            }
        }
    });

    Some(DeadlineGuard {
        _disarm: disarm.drop_guard(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use crate::session::SessionStatus;
    use crate::shape::Shape;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_deadline_is_a_no_op() {
        let session = Session::open(Shape::Unary, "calc.Calc/Sum", None, 1).session;
        assert!(attach(&session).is_none());
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_expiry_cancels_open_session() {
        let session = Session::open(
            Shape::Unary,
            "calc.Calc/Slow",
            Some(Duration::from_millis(20)),
            1,
        )
        .session;
        let _guard = attach(&session);

        tokio::time::timeout(Duration::from_secs(1), session.cancelled())
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Canceled);
        assert_eq!(session.error().unwrap().code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_completed_session_is_not_canceled_later() {
        let session = Session::open(
            Shape::Unary,
            "calc.Calc/Fast",
            Some(Duration::from_millis(20)),
            1,
        )
        .session;
        let _guard = attach(&session);

        session.complete(Ok(()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(session.status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_dropping_guard_disarms() {
        let session = Session::open(
            Shape::Unary,
            "calc.Calc/Fast",
            Some(Duration::from_millis(20)),
            1,
        )
        .session;
        drop(attach(&session));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(session.is_open());
    }
}
