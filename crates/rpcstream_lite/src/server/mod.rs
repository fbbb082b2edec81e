//! Handler side of rpcstream_lite.
//!
//! This module contains the `Registry` that maps method names to computations,
//! the `Runtime` that runs them against sessions, and the typed views a
//! computation uses to read requests and emit responses.

mod handler;
mod registry;
mod runtime;
mod session_map;

pub(crate) use handler::{Call, ErasedHandler};
pub use handler::{
    BidiStreamFn, ClientStreamFn, HandlerContext, RequestStream, ResponseSink, ServerStreamFn,
    UnaryFn,
};
pub use registry::Registry;
pub use runtime::Runtime;
pub use session_map::{SessionGuard, SessionMap};
