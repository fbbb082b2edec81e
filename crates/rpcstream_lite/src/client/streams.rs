use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::{Receiver, Sender};
use crate::codec;
use crate::deadline::DeadlineGuard;
use crate::error::Status;
use crate::server::SessionGuard;
use crate::session::{Session, SessionId};

/// Owns the caller's stake in a session.
///
/// Shared by every part of a call handed to the caller. When the last part goes
/// away before the session finished, the session is canceled.
pub(crate) struct CallGuard {
    session: Session,
    _deadline: Option<DeadlineGuard>,
    _registration: SessionGuard,
}

impl CallGuard {
    pub(crate) fn new(
        session: Session,
        deadline: Option<DeadlineGuard>,
        registration: SessionGuard,
    ) -> Self {
        Self {
            session,
            _deadline: deadline,
            _registration: registration,
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if self.session.cancel(Status::canceled("call dropped by caller")) {
            debug!(
                session_id = %self.session.id(),
                method = %self.session.method(),
                "Call dropped before completion, session canceled"
            );
        }
    }
}

/// Wait for the runtime's verdict, or for the session to be canceled first.
pub(crate) async fn await_reply(
    session: &Session,
    handle: JoinHandle<Result<Option<Bytes>, Status>>,
) -> Result<Option<Bytes>, Status> {
    tokio::select! {
        biased;
        _ = session.cancelled() => Err(session.abort_reason()),
        joined = handle => joined
            .map_err(|e| Status::internal(format!("runtime task failed: {e}")))?,
    }
}

/// Decode the single reply of a unary or client-streaming call.
pub(crate) fn decode_reply<Resp>(reply: Option<Bytes>) -> Result<Resp, Status>
where
    Resp: prost::Message + Default,
{
    let frame = reply.ok_or_else(|| Status::internal("handler produced no reply"))?;
    codec::decode(frame)
}

/// Caller side of the inbound channel for client and bidi streaming.
///
/// Dropping the sink without closing it closes the channel normally, so the
/// handler sees the end of the request stream.
pub struct RequestSink<Req> {
    inner: Sender<Bytes>,
    session: Session,
    _guard: Arc<CallGuard>,
    _marker: PhantomData<fn(Req)>,
}

impl<Req> RequestSink<Req>
where
    Req: prost::Message,
{
    pub(crate) fn new(session: Session, inner: Sender<Bytes>, guard: Arc<CallGuard>) -> Self {
        Self {
            inner,
            session,
            _guard: guard,
            _marker: PhantomData,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Send one request, waiting while the handler is behind.
    pub async fn send(&mut self, msg: &Req) -> Result<(), Status> {
        self.inner.send(codec::encode(msg)).await
    }

    /// Signal that no more requests follow.
    pub fn close(&mut self) -> Result<(), Status> {
        self.inner.close()
    }

    /// Abort the request stream with `status`. The session fails with it.
    pub fn close_with_error(&mut self, status: Status) -> Result<(), Status> {
        self.inner.close_with_error(status.clone())?;
        self.session.complete(Err(status));
        Ok(())
    }

    /// Pipe `requests` into the session, then close.
    ///
    /// An `Err` item ends the request stream with that error and fails the session.
    pub async fn forward<S>(&mut self, requests: S) -> Result<(), Status>
    where
        S: Stream<Item = Result<Req, Status>>,
    {
        futures::pin_mut!(requests);
        while let Some(item) = requests.next().await {
            match item {
                Ok(msg) => self.send(&msg).await?,
                Err(status) => {
                    warn!(
                        session_id = %self.session.id(),
                        method = %self.session.method(),
                        error = %status,
                        "Request stream failed"
                    );
                    self.close_with_error(status.clone())?;
                    return Err(status);
                }
            }
        }
        self.close()
    }

    /// Cancel the whole call.
    pub fn cancel(&self) -> bool {
        self.session.cancel(Status::canceled("canceled by caller"))
    }
}

impl<Req> Drop for RequestSink<Req> {
    fn drop(&mut self) {
        self.inner.close_if_open();
    }
}

/// Lazy sequence of responses for server and bidi streaming.
///
/// Yields each response in emission order. A failure ends the sequence after
/// being yielded once. Dropping the stream before it ends cancels the call,
/// unless a [`RequestSink`] of the same call is still alive.
pub struct ResponseStream<Resp> {
    inner: BoxStream<'static, Result<Resp, Status>>,
    session: Session,
    _guard: Arc<CallGuard>,
}

impl<Resp> ResponseStream<Resp>
where
    Resp: prost::Message + Default + 'static,
{
    pub(crate) fn new(session: Session, mut responses: Receiver<Bytes>, guard: Arc<CallGuard>) -> Self {
        let owner = session.clone();
        let inner = async_stream::stream! {
            loop {
                match responses.recv().await {
                    Ok(Some(frame)) => match codec::decode::<Resp>(frame) {
                        Ok(msg) => yield Ok(msg),
                        Err(status) => {
                            owner.complete(Err(status.clone()));
                            yield Err(status);
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(status);
                        break;
                    }
                }
            }
        };

        Self {
            inner: inner.boxed(),
            session,
            _guard: guard,
        }
    }
}

impl<Resp> ResponseStream<Resp> {
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// The next response, `Ok(None)` once the handler finished.
    pub async fn message(&mut self) -> Result<Option<Resp>, Status> {
        self.inner.next().await.transpose()
    }

    /// Cancel the whole call.
    pub fn cancel(&self) -> bool {
        self.session.cancel(Status::canceled("canceled by caller"))
    }
}

impl<Resp> Stream for ResponseStream<Resp> {
    type Item = Result<Resp, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// The final response of a client-streaming call.
pub struct PendingResponse<Resp> {
    inner: BoxFuture<'static, Result<Resp, Status>>,
    session: Session,
    _guard: Arc<CallGuard>,
}

impl<Resp> PendingResponse<Resp>
where
    Resp: prost::Message + Default + 'static,
{
    pub(crate) fn new(
        session: Session,
        handle: JoinHandle<Result<Option<Bytes>, Status>>,
        guard: Arc<CallGuard>,
    ) -> Self {
        let owner = session.clone();
        let inner = async move { decode_reply(await_reply(&owner, handle).await?) };

        Self {
            inner: inner.boxed(),
            session,
            _guard: guard,
        }
    }
}

impl<Resp> PendingResponse<Resp> {
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Cancel the whole call.
    pub fn cancel(&self) -> bool {
        self.session.cancel(Status::canceled("canceled by caller"))
    }
}

impl<Resp> Future for PendingResponse<Resp> {
    type Output = Result<Resp, Status>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}
