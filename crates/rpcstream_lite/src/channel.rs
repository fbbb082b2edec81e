//! A single-producer single-consumer message conduit with explicit termination.
//!
//! Messages are delivered in submission order. A channel ends in exactly one of
//! three terminal states. Messages queued before a normal end or an error are still
//! delivered; a cancellation discards them and wakes both sides immediately, even
//! after the sender already closed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::error::Status;

/// How a channel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// The sender signalled that no more messages follow.
    End,
    /// The sender failed.
    Error(Status),
    /// The consumer or the owning session aborted the channel.
    Canceled(Status),
}

impl Terminal {
    fn rejection(&self) -> Status {
        match self {
            Terminal::End => Status::internal("channel closed: no more messages accepted"),
            Terminal::Error(status) | Terminal::Canceled(status) => status.clone(),
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::End => f.write_str("closed normally"),
            Terminal::Error(status) => write!(f, "closed with error ({status})"),
            Terminal::Canceled(status) => write!(f, "canceled ({status})"),
        }
    }
}

struct State<T> {
    queue: VecDeque<T>,
    terminal: Option<Terminal>,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    readable: Notify,
    writable: Notify,
}

impl<T> Shared<T> {
    fn set_terminal(&self, terminal: Terminal) -> Result<(), Terminal> {
        {
            let mut state = self.state.lock();
            match (&state.terminal, &terminal) {
                (None, _) => {}
                // A cancellation still overrides a normal or error close.
                (Some(Terminal::End | Terminal::Error(_)), Terminal::Canceled(_)) => {}
                (Some(existing), _) => return Err(existing.clone()),
            }
            if matches!(terminal, Terminal::Canceled(_)) {
                state.queue.clear();
            }
            state.terminal = Some(terminal);
        }
        self.readable.notify_waiters();
        self.writable.notify_waiters();
        Ok(())
    }

    fn terminal(&self) -> Option<Terminal> {
        self.state.lock().terminal.clone()
    }

    /// Public close path: a second terminal call is reported, never swallowed.
    fn close(&self, terminal: Terminal) -> Result<(), Status> {
        self.set_terminal(terminal.clone()).map_err(|existing| {
            warn!(%existing, rejected = %terminal, "Channel already terminal");
            Status::internal(format!("channel already {existing}; rejected: {terminal}"))
        })
    }
}

/// Type-erased handle a session keeps so it can force its channels to a terminal state.
pub(crate) trait Terminate: Send + Sync {
    /// Returns false when the channel was already terminal.
    fn terminate(&self, terminal: Terminal) -> bool;
}

impl<T: Send> Terminate for Shared<T> {
    fn terminate(&self, terminal: Terminal) -> bool {
        self.set_terminal(terminal).is_ok()
    }
}

/// Create a bounded channel. `send` waits while `capacity` messages are queued.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            terminal: None,
        }),
        capacity: capacity.max(1),
        readable: Notify::new(),
        writable: Notify::new(),
    });
    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver { shared },
    )
}

/// The producing end of a channel.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Enqueue a message, waiting for room if the channel is full.
    ///
    /// Fails once the channel is terminal, including while waiting for room.
    pub async fn send(&self, message: T) -> Result<(), Status> {
        let mut message = Some(message);
        loop {
            let notified = self.shared.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if let Some(terminal) = &state.terminal {
                    return Err(terminal.rejection());
                }
                if state.queue.len() < self.shared.capacity {
                    if let Some(message) = message.take() {
                        state.queue.push_back(message);
                    }
                    drop(state);
                    self.shared.readable.notify_waiters();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Signal that no more messages follow.
    pub fn close(&self) -> Result<(), Status> {
        self.shared.close(Terminal::End)
    }

    /// Signal that the producer failed.
    pub fn close_with_error(&self, status: Status) -> Result<(), Status> {
        self.shared.close(Terminal::Error(status))
    }

    /// Close normally unless the channel already ended. Never reports reuse.
    pub(crate) fn close_if_open(&self) -> bool {
        self.shared.set_terminal(Terminal::End).is_ok()
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.shared.terminal()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal().is_some()
    }

    pub(crate) fn terminator(&self) -> Arc<dyn Terminate>
    where
        T: Send + 'static,
    {
        Arc::clone(&self.shared) as Arc<dyn Terminate>
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("terminal", &self.terminal())
            .finish()
    }
}

/// The consuming end of a channel.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the sender closed normally and the queue is drained,
    /// and `Err` for an error close or a cancellation.
    pub async fn recv(&mut self) -> Result<Option<T>, Status> {
        loop {
            let notified = self.shared.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if let Some(Terminal::Canceled(reason)) = &state.terminal {
                    return Err(reason.clone());
                }
                if let Some(message) = state.queue.pop_front() {
                    drop(state);
                    self.shared.writable.notify_waiters();
                    return Ok(Some(message));
                }
                match &state.terminal {
                    Some(Terminal::End) => return Ok(None),
                    Some(Terminal::Error(status) | Terminal::Canceled(status)) => {
                        return Err(status.clone());
                    }
                    None => {}
                }
            }

            notified.await;
        }
    }

    /// Abort the channel from the consuming side.
    pub fn cancel(&self, reason: Status) -> Result<(), Status> {
        self.shared.close(Terminal::Canceled(reason))
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.shared.terminal()
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("terminal", &self.terminal())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Code;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_messages_arrive_in_order_then_end() {
        let (tx, mut rx) = channel(8);
        for n in [3, 1, 2] {
            tx.send(n).await.unwrap();
        }
        tx.close().unwrap();

        assert_eq!(rx.recv().await.unwrap(), Some(3));
        assert_eq!(rx.recv().await.unwrap(), Some(1));
        assert_eq!(rx.recv().await.unwrap(), Some(2));
        assert_eq!(rx.recv().await.unwrap(), None);
        assert_eq!(rx.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_close_delivers_queued_messages_first() {
        let (tx, mut rx) = channel(8);
        tx.send("a").await.unwrap();
        tx.close_with_error(Status::transport("connection reset"))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Some("a"));
        let err = rx.recv().await.unwrap_err();
        assert_eq!(err.code(), Code::Transport);
    }

    #[tokio::test]
    async fn test_send_after_terminal_fails() {
        let (tx, _rx) = channel(8);
        tx.close().unwrap();
        let err = tx.send(1).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_second_close_is_reported() {
        let (tx, mut rx) = channel::<u8>(8);
        tx.close().unwrap();

        let err = tx
            .close_with_error(Status::internal("late failure"))
            .unwrap_err();
        assert!(err.message().contains("late failure"));

        // The first terminal call stands.
        assert_eq!(rx.recv().await.unwrap(), None);
        assert_eq!(tx.terminal(), Some(Terminal::End));
    }

    #[tokio::test]
    async fn test_blocked_receive_wakes_on_close() {
        let (tx, mut rx) = channel::<u8>(8);
        let waiter = tokio::spawn(async move { rx.recv().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.close().unwrap();

        let received = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancel_discards_queue_and_wakes_receiver() {
        let (tx, mut rx) = channel(8);
        tx.send(1).await.unwrap();
        rx.cancel(Status::canceled("consumer gave up")).unwrap();

        let err = rx.recv().await.unwrap_err();
        assert_eq!(err.code(), Code::Canceled);
        let err = tx.send(2).await.unwrap_err();
        assert_eq!(err.code(), Code::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_overrides_earlier_close() {
        let (tx, mut rx) = channel(8);
        tx.send(1).await.unwrap();
        tx.close().unwrap();

        rx.cancel(Status::deadline_exceeded("deadline")).unwrap();
        assert_eq!(rx.recv().await.unwrap_err().code(), Code::DeadlineExceeded);

        // Once canceled, nothing overrides it.
        assert!(rx.cancel(Status::canceled("again")).is_err());
        assert!(tx.close_with_error(Status::internal("late")).is_err());
    }

    #[tokio::test]
    async fn test_full_channel_applies_backpressure() {
        let (tx, mut rx) = channel(1);
        tx.send(1).await.unwrap();

        assert!(timeout(Duration::from_millis(50), tx.send(2)).await.is_err());

        assert_eq!(rx.recv().await.unwrap(), Some(1));
        timeout(Duration::from_secs(1), tx.send(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_blocked_send_wakes_on_cancel() {
        let (tx, _rx) = channel(1);
        tx.send(1).await.unwrap();
        let terminator = tx.terminator();

        let sender = tokio::spawn(async move { tx.send(2).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(terminator.terminate(Terminal::Canceled(Status::deadline_exceeded("late"))));

        let err = timeout(Duration::from_secs(1), sender)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(!terminator.terminate(Terminal::End));
    }
}
