//! Streaming RPC sessions over in-process message channels.
//!
//! A call opens a [`Session`] shaped as unary, server-streaming, client-streaming
//! or bidi-streaming. The session owns bounded [`channel`]s in each direction it
//! needs, an optional deadline and a monotonic status. Handlers registered in a
//! [`Registry`] run on the [`Runtime`], and [`RpcClient`] wires callers to them.

pub mod channel;
pub mod client;
pub mod codec;
pub mod deadline;
pub mod error;
pub mod path;
pub mod server;
pub mod session;
pub mod shape;

pub use client::{CallOptions, ClientConfig, PendingResponse, RequestSink, ResponseStream, RpcClient};
pub use error::{Code, RegistryError, RpcPathError, SessionError, Status};
pub use path::MethodPath;
pub use server::{HandlerContext, Registry, RequestStream, ResponseSink, Runtime};
pub use session::{Session, SessionId, SessionStatus};
pub use shape::Shape;
