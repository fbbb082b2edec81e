//! Caller side of rpcstream_lite.
//!
//! `RpcClient` opens one session per call and drives it through the shape the
//! caller asked for.
//!
//! # Example
//!
//! ```ignore
//! use rpcstream_lite::client::{CallOptions, ClientConfig, RpcClient};
//!
//! let client = RpcClient::new(registry, ClientConfig::default());
//!
//! // One request, one response
//! let reply: SumResponse = client
//!     .call_unary("calculator.CalculatorService/Sum", &request, CallOptions::default())
//!     .await?;
//!
//! // Send and receive independently
//! let (mut sink, mut responses) = client
//!     .call_bidi_stream::<FindMaximumRequest, FindMaximumResponse>(
//!         "calculator.CalculatorService/FindMaximum",
//!         CallOptions::default(),
//!     )
//!     .await?;
//! tokio::spawn(async move {
//!     for number in [4, 7, 2] {
//!         sink.send(&FindMaximumRequest { number }).await?;
//!     }
//!     sink.close()
//! });
//! while let Some(reply) = responses.message().await? {
//!     println!("new maximum: {}", reply.maximum);
//! }
//! ```

mod config;
mod rpc_client;
mod streams;

pub use config::{CallOptions, ClientConfig};
pub use rpc_client::RpcClient;
pub use streams::{PendingResponse, RequestSink, ResponseStream};
