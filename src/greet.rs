//! Greeting service exercising each interaction shape, plus a slow call for deadlines.

use rpcstream_lite::{HandlerContext, Registry, RegistryError, RequestStream, ResponseSink, Status};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::proto::greet::{
    GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest, GreetManyTimesResponse,
    GreetRequest, GreetResponse, GreetWithDeadlineRequest, GreetWithDeadlineResponse,
    LongGreetRequest, LongGreetResponse,
};

pub const SERVICE: &str = "greet.GreetService";

pub const GREET: &str = "greet.GreetService/Greet";
pub const GREET_MANY_TIMES: &str = "greet.GreetService/GreetManyTimes";
pub const LONG_GREET: &str = "greet.GreetService/LongGreet";
pub const GREET_EVERYONE: &str = "greet.GreetService/GreetEveryone";
pub const GREET_WITH_DEADLINE: &str = "greet.GreetService/GreetWithDeadline";

/// Pacing of the greet handlers that take time.
#[derive(Debug, Clone)]
pub struct GreetConfig {
    /// Responses sent by GreetManyTimes.
    pub repeat: u32,

    /// Pause after each GreetManyTimes response.
    pub interval: Duration,

    /// Waits GreetWithDeadline performs before answering.
    pub steps: u32,

    /// Length of each GreetWithDeadline wait.
    pub step: Duration,
}

impl Default for GreetConfig {
    fn default() -> Self {
        Self {
            repeat: 10,
            interval: Duration::from_secs(1),
            steps: 3,
            step: Duration::from_secs(1),
        }
    }
}

impl GreetConfig {
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Total time GreetWithDeadline takes when it is not interrupted.
    pub fn deadline_work(&self) -> Duration {
        self.step * self.steps
    }
}

/// Register every greet method.
pub fn register(registry: &mut Registry, config: GreetConfig) -> Result<(), RegistryError> {
    let config = Arc::new(config);

    registry.register_unary(GREET, greet)?;
    registry.register_server_stream(GREET_MANY_TIMES, {
        let config = Arc::clone(&config);
        move |ctx, req, responses| greet_many_times(Arc::clone(&config), ctx, req, responses)
    })?;
    registry.register_client_stream(LONG_GREET, long_greet)?;
    registry.register_bidi_stream(GREET_EVERYONE, greet_everyone)?;
    registry.register_unary(GREET_WITH_DEADLINE, move |ctx, req| {
        greet_with_deadline(Arc::clone(&config), ctx, req)
    })?;
    Ok(())
}

async fn greet(_ctx: HandlerContext, req: GreetRequest) -> Result<GreetResponse, Status> {
    info!(first_name = req.first_name(), "Greet invoked");
    Ok(GreetResponse {
        result: format!("Hello {}", req.first_name()),
    })
}

async fn greet_many_times(
    config: Arc<GreetConfig>,
    ctx: HandlerContext,
    req: GreetManyTimesRequest,
    mut responses: ResponseSink<GreetManyTimesResponse>,
) -> Result<(), Status> {
    info!(first_name = req.first_name(), repeat = config.repeat, "GreetManyTimes invoked");

    for i in 0..config.repeat {
        responses
            .send(&GreetManyTimesResponse {
                result: format!("Hello {} number {i}", req.first_name()),
            })
            .await?;
        ctx.sleep(config.interval).await?;
    }
    Ok(())
}

async fn long_greet(
    _ctx: HandlerContext,
    mut requests: RequestStream<LongGreetRequest>,
) -> Result<LongGreetResponse, Status> {
    info!("LongGreet invoked");

    let mut result = String::new();
    while let Some(req) = requests.message().await? {
        result.push_str(&format!("Hello {}! ", req.first_name()));
    }
    Ok(LongGreetResponse { result })
}

async fn greet_everyone(
    _ctx: HandlerContext,
    mut requests: RequestStream<GreetEveryoneRequest>,
    mut responses: ResponseSink<GreetEveryoneResponse>,
) -> Result<(), Status> {
    info!("GreetEveryone invoked");

    while let Some(req) = requests.message().await? {
        responses
            .send(&GreetEveryoneResponse {
                result: format!("Hello {}! ", req.first_name()),
            })
            .await?;
    }
    Ok(())
}

async fn greet_with_deadline(
    config: Arc<GreetConfig>,
    ctx: HandlerContext,
    req: GreetWithDeadlineRequest,
) -> Result<GreetWithDeadlineResponse, Status> {
    info!(
        first_name = req.first_name(),
        remaining_ms = ctx.remaining().map(|d| d.as_millis() as u64),
        "GreetWithDeadline invoked"
    );

    for _ in 0..config.steps {
        if ctx.sleep(config.step).await.is_err() {
            warn!(session_id = %ctx.session_id(), "The client has cancelled the request");
            return Err(Status::canceled("the client has cancelled the request"));
        }
    }

    Ok(GreetWithDeadlineResponse {
        result: format!("Hello {}, {}", req.first_name(), req.last_name()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::greet::Greeting;
    use futures::StreamExt;
    use rpcstream_lite::{CallOptions, ClientConfig, Code, RpcClient};

    fn fast() -> GreetConfig {
        GreetConfig::default()
            .with_interval(Duration::from_millis(1))
            .with_step(Duration::from_millis(20))
    }

    fn client(config: GreetConfig) -> RpcClient {
        let mut registry = Registry::new();
        register(&mut registry, config).unwrap();
        RpcClient::new(registry, ClientConfig::default())
    }

    fn angel() -> Greeting {
        Greeting::new("Angel", "Dionisio")
    }

    #[tokio::test]
    async fn test_greet() {
        let client = client(fast());

        let reply: GreetResponse = client
            .call_unary(GREET, &GreetRequest::new(angel()), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.result, "Hello Angel");
    }

    #[tokio::test]
    async fn test_greet_many_times() {
        let client = client(fast().with_repeat(3));

        let results: Vec<String> = client
            .call_server_stream::<_, GreetManyTimesResponse>(
                GREET_MANY_TIMES,
                &GreetManyTimesRequest::new(angel()),
                CallOptions::default(),
            )
            .await
            .unwrap()
            .map(|reply| reply.unwrap().result)
            .collect()
            .await;

        assert_eq!(
            results,
            vec![
                "Hello Angel number 0",
                "Hello Angel number 1",
                "Hello Angel number 2"
            ]
        );
    }

    #[tokio::test]
    async fn test_long_greet() {
        let client = client(fast());

        let (mut sink, reply) = client
            .call_client_stream::<LongGreetRequest, LongGreetResponse>(
                LONG_GREET,
                CallOptions::default(),
            )
            .await
            .unwrap();
        for name in ["Angel", "Luz", "Julio", "Jose"] {
            sink.send(&LongGreetRequest::new(Greeting::new(name, "")))
                .await
                .unwrap();
        }
        drop(sink);

        assert_eq!(
            reply.await.unwrap().result,
            "Hello Angel! Hello Luz! Hello Julio! Hello Jose! "
        );
    }

    #[tokio::test]
    async fn test_greet_everyone() {
        let client = client(fast());

        let (mut sink, mut responses) = client
            .call_bidi_stream::<GreetEveryoneRequest, GreetEveryoneResponse>(
                GREET_EVERYONE,
                CallOptions::default(),
            )
            .await
            .unwrap();

        // Each greeting answers the request that triggered it.
        for name in ["Angel", "Luz"] {
            sink.send(&GreetEveryoneRequest::new(Greeting::new(name, "")))
                .await
                .unwrap();
            let reply = responses.message().await.unwrap().unwrap();
            assert_eq!(reply.result, format!("Hello {name}! "));
        }

        sink.close().unwrap();
        assert!(responses.message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_greet_with_deadline_completes_in_time() {
        let config = fast();
        let deadline = config.deadline_work() * 10;
        let client = client(config);

        let reply: GreetWithDeadlineResponse = client
            .call_unary(
                GREET_WITH_DEADLINE,
                &GreetWithDeadlineRequest::new(angel()),
                CallOptions::builder().deadline(deadline).build(),
            )
            .await
            .unwrap();
        assert_eq!(reply.result, "Hello Angel, Dionisio");
    }

    #[tokio::test]
    async fn test_greet_with_deadline_exceeded() {
        let config = fast();
        let deadline = config.step / 2;
        let client = client(config);

        let err = client
            .call_unary::<_, GreetWithDeadlineResponse>(
                GREET_WITH_DEADLINE,
                &GreetWithDeadlineRequest::new(angel()),
                CallOptions::builder().deadline(deadline).build(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_missing_greeting_is_empty_name() {
        let client = client(fast());

        let reply: GreetResponse = client
            .call_unary(GREET, &GreetRequest::default(), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.result, "Hello ");
    }
}
