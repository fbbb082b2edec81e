use std::sync::Arc;
use tracing::{debug, info};

use crate::codec;
use crate::deadline;
use crate::error::{RegistryError, Status};
use crate::path::MethodPath;
use crate::server::{Call, ErasedHandler, Registry, Runtime, SessionMap};
use crate::session::{ChannelPair, OpenSession, Session, SessionId};
use crate::shape::Shape;

use super::config::{CallOptions, ClientConfig};
use super::streams::{
    CallGuard, PendingResponse, RequestSink, ResponseStream, await_reply, decode_reply,
};

/// Drives calls of every shape against a registry of computations.
///
/// Each call opens its own session, so concurrent calls on the same method never
/// observe each other.
pub struct RpcClient {
    registry: Arc<Registry>,
    runtime: Runtime,
    sessions: Arc<SessionMap>,
    config: ClientConfig,
}

/// A session that has been opened, tracked and armed, ready to invoke.
struct Started {
    session: Session,
    handler: Arc<dyn ErasedHandler>,
    guard: Arc<CallGuard>,
    inbound: Option<ChannelPair>,
    outbound: Option<ChannelPair>,
}

impl RpcClient {
    pub fn new(registry: impl Into<Arc<Registry>>, config: ClientConfig) -> Self {
        Self {
            registry: registry.into(),
            runtime: Runtime::new(config.cancel_grace),
            sessions: Arc::new(SessionMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of calls currently in flight.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id)
    }

    /// Cancel every call in flight. Returns how many were still open.
    pub fn cancel_all(&self, reason: Status) -> usize {
        let canceled = self.sessions.cancel_all(&reason);
        if canceled > 0 {
            info!(canceled, reason = %reason, "Canceled active sessions");
        }
        canceled
    }

    fn start(&self, method: &str, shape: Shape, options: &CallOptions) -> Result<Started, Status> {
        let method = MethodPath::parse(method)
            .map_err(RegistryError::from)?
            .to_string();
        let handler = self.registry.lookup(&method, shape).inspect_err(|e| {
            debug!(method = %method, shape = %shape, error = %e, "Call rejected");
        })?;

        let OpenSession {
            session,
            inbound,
            outbound,
        } = Session::open(
            shape,
            method,
            options.effective_deadline(&self.config),
            self.config.channel_capacity,
        );

        let registration = self.sessions.try_register(&session)?;
        let guard = Arc::new(CallGuard::new(
            session.clone(),
            deadline::attach(&session),
            registration,
        ));

        Ok(Started {
            session,
            handler,
            guard,
            inbound,
            outbound,
        })
    }

    /// One request, one response.
    ///
    /// Dropping the returned future before it resolves cancels the call.
    pub async fn call_unary<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<Resp, Status>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let Started {
            session,
            handler,
            guard,
            ..
        } = self.start(method, Shape::Unary, &options)?;

        let handle = self.runtime.invoke(
            session.clone(),
            handler,
            Call::Unary {
                request: codec::encode(request),
            },
        );
        let reply = await_reply(&session, handle).await;
        drop(guard);

        decode_reply(reply?)
    }

    /// One request, a lazy sequence of responses.
    pub async fn call_server_stream<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        options: CallOptions,
    ) -> Result<ResponseStream<Resp>, Status>
    where
        Req: prost::Message,
        Resp: prost::Message + Default + 'static,
    {
        let Started {
            session,
            handler,
            guard,
            outbound,
            ..
        } = self.start(method, Shape::ServerStreaming, &options)?;
        let (responses, receiver) = require(outbound, &session, "outbound")?;

        self.runtime.invoke(
            session.clone(),
            handler,
            Call::ServerStreaming {
                request: codec::encode(request),
                responses,
            },
        );

        Ok(ResponseStream::new(session, receiver, guard))
    }

    /// A sink for requests and the promise of one final response.
    ///
    /// The handler computes its reply once the sink is closed or dropped.
    pub async fn call_client_stream<Req, Resp>(
        &self,
        method: &str,
        options: CallOptions,
    ) -> Result<(RequestSink<Req>, PendingResponse<Resp>), Status>
    where
        Req: prost::Message,
        Resp: prost::Message + Default + 'static,
    {
        let Started {
            session,
            handler,
            guard,
            inbound,
            ..
        } = self.start(method, Shape::ClientStreaming, &options)?;
        let (sender, requests) = require(inbound, &session, "inbound")?;

        let handle = self
            .runtime
            .invoke(session.clone(), handler, Call::ClientStreaming { requests });

        let sink = RequestSink::new(session.clone(), sender, Arc::clone(&guard));
        Ok((sink, PendingResponse::new(session, handle, guard)))
    }

    /// A sink for requests and a lazy sequence of responses, progressing independently.
    ///
    /// Move the sink into its own task to send while reading responses.
    pub async fn call_bidi_stream<Req, Resp>(
        &self,
        method: &str,
        options: CallOptions,
    ) -> Result<(RequestSink<Req>, ResponseStream<Resp>), Status>
    where
        Req: prost::Message,
        Resp: prost::Message + Default + 'static,
    {
        let Started {
            session,
            handler,
            guard,
            inbound,
            outbound,
        } = self.start(method, Shape::BidiStreaming, &options)?;
        let (sender, requests) = require(inbound, &session, "inbound")?;
        let (responses, receiver) = require(outbound, &session, "outbound")?;

        self.runtime.invoke(
            session.clone(),
            handler,
            Call::BidiStreaming {
                requests,
                responses,
            },
        );

        let sink = RequestSink::new(session.clone(), sender, Arc::clone(&guard));
        Ok((sink, ResponseStream::new(session, receiver, guard)))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("methods", &self.registry.len())
            .field("active_sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}

fn require(
    pair: Option<ChannelPair>,
    session: &Session,
    direction: &str,
) -> Result<ChannelPair, Status> {
    pair.ok_or_else(|| {
        Status::internal(format!(
            "{} session has no {direction} channel",
            session.shape()
        ))
    })
}
