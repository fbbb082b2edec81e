use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::channel::{Receiver, Sender};
use crate::codec;
use crate::error::Status;
use crate::session::{Session, SessionId};
use crate::shape::Shape;

/// What a computation sees of the session it runs in.
#[derive(Clone, Debug)]
pub struct HandlerContext {
    session: Session,
}

impl HandlerContext {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    pub fn method(&self) -> &str {
        self.session.method()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.session.deadline()
    }

    /// Time left before the deadline fires, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.session.is_cancelled()
    }

    /// Resolves once the session is canceled, by the caller or by its deadline.
    pub async fn cancelled(&self) {
        self.session.cancelled().await;
    }

    /// `Err` with the cancellation reason once the session is canceled.
    pub fn check(&self) -> Result<(), Status> {
        if self.is_cancelled() {
            Err(self.session.abort_reason())
        } else {
            Ok(())
        }
    }

    /// Sleep, returning early with the cancellation reason if the session is canceled.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Status> {
        tokio::select! {
            biased;
            _ = self.session.cancelled() => Err(self.session.abort_reason()),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Typed view of the inbound channel handed to streaming computations.
pub struct RequestStream<Req> {
    inner: Receiver<Bytes>,
    _marker: PhantomData<fn() -> Req>,
}

impl<Req> RequestStream<Req>
where
    Req: prost::Message + Default,
{
    pub(crate) fn new(inner: Receiver<Bytes>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// The next request, `Ok(None)` once the caller closed its side.
    pub async fn message(&mut self) -> Result<Option<Req>, Status> {
        match self.inner.recv().await? {
            Some(frame) => codec::decode(frame).map(Some),
            None => Ok(None),
        }
    }
}

/// Typed view of the outbound channel handed to streaming computations.
///
/// There is no explicit close: the runtime ends the stream when the computation returns.
pub struct ResponseSink<Resp> {
    inner: Sender<Bytes>,
    _marker: PhantomData<fn(Resp)>,
}

impl<Resp> ResponseSink<Resp>
where
    Resp: prost::Message,
{
    pub(crate) fn new(inner: Sender<Bytes>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Emit one response, waiting while the caller is behind.
    pub async fn send(&mut self, msg: &Resp) -> Result<(), Status> {
        self.inner.send(codec::encode(msg)).await
    }
}

/// Untyped inputs for one invocation, shaped like the session.
pub(crate) enum Call {
    Unary {
        request: Bytes,
    },
    ServerStreaming {
        request: Bytes,
        responses: Sender<Bytes>,
    },
    ClientStreaming {
        requests: Receiver<Bytes>,
    },
    BidiStreaming {
        requests: Receiver<Bytes>,
        responses: Sender<Bytes>,
    },
}

impl Call {
    fn shape(&self) -> Shape {
        match self {
            Call::Unary { .. } => Shape::Unary,
            Call::ServerStreaming { .. } => Shape::ServerStreaming,
            Call::ClientStreaming { .. } => Shape::ClientStreaming,
            Call::BidiStreaming { .. } => Shape::BidiStreaming,
        }
    }
}

fn mismatch(expected: Shape, call: &Call) -> Status {
    Status::internal(format!(
        "{expected} handler invoked with a {} call",
        call.shape()
    ))
}

/// A type-erased handler that can be stored in the registry.
///
/// Decodes the request frames, runs the computation and encodes the final reply.
/// `Ok(None)` means the computation streamed its responses instead.
pub(crate) trait ErasedHandler: Send + Sync {
    fn shape(&self) -> Shape;

    fn call(
        &self,
        ctx: HandlerContext,
        call: Call,
    ) -> BoxFuture<'static, Result<Option<Bytes>, Status>>;
}

pub type UnaryFn<Req, Resp> = Arc<
    dyn Fn(HandlerContext, Req) -> BoxFuture<'static, Result<Resp, Status>> + Send + Sync,
>;

pub type ServerStreamFn<Req, Resp> = Arc<
    dyn Fn(HandlerContext, Req, ResponseSink<Resp>) -> BoxFuture<'static, Result<(), Status>>
        + Send
        + Sync,
>;

pub type ClientStreamFn<Req, Resp> = Arc<
    dyn Fn(HandlerContext, RequestStream<Req>) -> BoxFuture<'static, Result<Resp, Status>>
        + Send
        + Sync,
>;

pub type BidiStreamFn<Req, Resp> = Arc<
    dyn Fn(
            HandlerContext,
            RequestStream<Req>,
            ResponseSink<Resp>,
        ) -> BoxFuture<'static, Result<(), Status>>
        + Send
        + Sync,
>;

pub(crate) struct UnaryHandler<Req, Resp> {
    f: UnaryFn<Req, Resp>,
}

impl<Req, Resp> UnaryHandler<Req, Resp> {
    pub fn new(f: UnaryFn<Req, Resp>) -> Self {
        Self { f }
    }
}

impl<Req, Resp> ErasedHandler for UnaryHandler<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + 'static,
{
    fn shape(&self) -> Shape {
        Shape::Unary
    }

    fn call(
        &self,
        ctx: HandlerContext,
        call: Call,
    ) -> BoxFuture<'static, Result<Option<Bytes>, Status>> {
        let f = Arc::clone(&self.f);
        async move {
            match call {
                Call::Unary { request } => {
                    let request = codec::decode::<Req>(request)?;
                    let response = f(ctx, request).await?;
                    Ok(Some(codec::encode(&response)))
                }
                other => Err(mismatch(Shape::Unary, &other)),
            }
        }
        .boxed()
    }
}

pub(crate) struct ServerStreamHandler<Req, Resp> {
    f: ServerStreamFn<Req, Resp>,
}

impl<Req, Resp> ServerStreamHandler<Req, Resp> {
    pub fn new(f: ServerStreamFn<Req, Resp>) -> Self {
        Self { f }
    }
}

impl<Req, Resp> ErasedHandler for ServerStreamHandler<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + 'static,
{
    fn shape(&self) -> Shape {
        Shape::ServerStreaming
    }

    fn call(
        &self,
        ctx: HandlerContext,
        call: Call,
    ) -> BoxFuture<'static, Result<Option<Bytes>, Status>> {
        let f = Arc::clone(&self.f);
        async move {
            match call {
                Call::ServerStreaming { request, responses } => {
                    let request = codec::decode::<Req>(request)?;
                    f(ctx, request, ResponseSink::new(responses)).await?;
                    Ok(None)
                }
                other => Err(mismatch(Shape::ServerStreaming, &other)),
            }
        }
        .boxed()
    }
}

pub(crate) struct ClientStreamHandler<Req, Resp> {
    f: ClientStreamFn<Req, Resp>,
}

impl<Req, Resp> ClientStreamHandler<Req, Resp> {
    pub fn new(f: ClientStreamFn<Req, Resp>) -> Self {
        Self { f }
    }
}

impl<Req, Resp> ErasedHandler for ClientStreamHandler<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + 'static,
{
    fn shape(&self) -> Shape {
        Shape::ClientStreaming
    }

    fn call(
        &self,
        ctx: HandlerContext,
        call: Call,
    ) -> BoxFuture<'static, Result<Option<Bytes>, Status>> {
        let f = Arc::clone(&self.f);
        async move {
            match call {
                Call::ClientStreaming { requests } => {
                    let response = f(ctx, RequestStream::new(requests)).await?;
                    Ok(Some(codec::encode(&response)))
                }
                other => Err(mismatch(Shape::ClientStreaming, &other)),
            }
        }
        .boxed()
    }
}

pub(crate) struct BidiStreamHandler<Req, Resp> {
    f: BidiStreamFn<Req, Resp>,
}

impl<Req, Resp> BidiStreamHandler<Req, Resp> {
    pub fn new(f: BidiStreamFn<Req, Resp>) -> Self {
        Self { f }
    }
}

impl<Req, Resp> ErasedHandler for BidiStreamHandler<Req, Resp>
where
    Req: prost::Message + Default + 'static,
    Resp: prost::Message + 'static,
{
    fn shape(&self) -> Shape {
        Shape::BidiStreaming
    }

    fn call(
        &self,
        ctx: HandlerContext,
        call: Call,
    ) -> BoxFuture<'static, Result<Option<Bytes>, Status>> {
        let f = Arc::clone(&self.f);
        async move {
            match call {
                Call::BidiStreaming {
                    requests,
                    responses,
                } => {
                    f(
                        ctx,
                        RequestStream::new(requests),
                        ResponseSink::new(responses),
                    )
                    .await?;
                    Ok(None)
                }
                other => Err(mismatch(Shape::BidiStreaming, &other)),
            }
        }
        .boxed()
    }
}
