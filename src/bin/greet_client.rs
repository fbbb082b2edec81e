use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use rpc_shapes::proto::greet::{
    GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest, GreetManyTimesResponse,
    GreetRequest, GreetResponse, GreetWithDeadlineRequest, GreetWithDeadlineResponse, Greeting,
    LongGreetRequest, LongGreetResponse,
};
use rpc_shapes::{GreetConfig, connect, duration_from_env, greet, init_tracing};
use rpcstream_lite::{CallOptions, ClientConfig, Code, RpcClient};
use tracing::{info, warn};

const NAMES: [&str; 4] = ["Angel", "Luz", "Julio", "Jose"];

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut greet_config = GreetConfig::default();
    if let Some(interval) = duration_from_env("GREET_INTERVAL_MS") {
        greet_config = greet_config.with_interval(interval).with_step(interval);
    }
    let work = greet_config.deadline_work();
    let client = connect(greet_config, ClientConfig::default())?;

    do_unary(&client).await?;
    do_server_streaming(&client).await?;
    do_client_streaming(&client).await?;
    do_bidi_streaming(&client).await?;

    // The first should complete, the second should time out.
    let deadline = duration_from_env("RPC_DEADLINE_MS");
    do_unary_with_deadline(&client, deadline.unwrap_or(work + work * 2 / 3)).await?;
    do_unary_with_deadline(&client, work / 3).await?;

    Ok(())
}

fn greeting(first_name: &str) -> Greeting {
    Greeting::new(first_name, "Dionisio")
}

async fn do_unary(client: &RpcClient) -> Result<()> {
    info!("Starting to do a Greet unary RPC");

    let reply: GreetResponse = client
        .call_unary(
            greet::GREET,
            &GreetRequest::new(greeting("Angel")),
            CallOptions::default(),
        )
        .await
        .context("error while calling Greet RPC")?;

    info!(result = %reply.result, "Response from Greet");
    Ok(())
}

async fn do_server_streaming(client: &RpcClient) -> Result<()> {
    info!("Starting to do a GreetManyTimes server streaming RPC");

    let mut stream = client
        .call_server_stream::<_, GreetManyTimesResponse>(
            greet::GREET_MANY_TIMES,
            &GreetManyTimesRequest::new(greeting("Angel")),
            CallOptions::default(),
        )
        .await
        .context("error while calling GreetManyTimes RPC")?;

    while let Some(reply) = stream.next().await {
        let reply = reply.context("error while reading stream")?;
        info!(result = %reply.result, "Response from GreetManyTimes");
    }
    Ok(())
}

async fn do_client_streaming(client: &RpcClient) -> Result<()> {
    info!("Starting to do a LongGreet client streaming RPC");

    let (mut sink, reply) = client
        .call_client_stream::<LongGreetRequest, LongGreetResponse>(
            greet::LONG_GREET,
            CallOptions::default(),
        )
        .await
        .context("error while calling LongGreet RPC")?;

    let requests = futures::stream::iter(NAMES)
        .map(|name| Ok(LongGreetRequest::new(greeting(name))));
    sink.forward(requests).await?;

    let reply = reply
        .await
        .context("error while receiving response from LongGreet RPC")?;
    info!(result = %reply.result, "LongGreet response");
    Ok(())
}

async fn do_bidi_streaming(client: &RpcClient) -> Result<()> {
    info!("Starting to do a GreetEveryone bidi streaming RPC");

    let (mut sink, mut responses) = client
        .call_bidi_stream::<GreetEveryoneRequest, GreetEveryoneResponse>(
            greet::GREET_EVERYONE,
            CallOptions::default(),
        )
        .await
        .context("error while creating stream")?;

    let sender = tokio::spawn(async move {
        for name in NAMES {
            info!(first_name = name, "Sending message");
            sink.send(&GreetEveryoneRequest::new(greeting(name))).await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        sink.close()
    });

    while let Some(reply) = responses
        .message()
        .await
        .context("error while receiving from GreetEveryone")?
    {
        info!(result = %reply.result, "Received");
    }
    sender.await??;
    Ok(())
}

async fn do_unary_with_deadline(client: &RpcClient, deadline: Duration) -> Result<()> {
    info!(deadline_ms = deadline.as_millis() as u64, "Starting GreetWithDeadline unary RPC");

    let result = client
        .call_unary::<_, GreetWithDeadlineResponse>(
            greet::GREET_WITH_DEADLINE,
            &GreetWithDeadlineRequest::new(greeting("Angel")),
            CallOptions::builder().deadline(deadline).build(),
        )
        .await;

    match result {
        Ok(reply) => info!(result = %reply.result, "Response from GreetWithDeadline"),
        Err(status) if status.code() == Code::DeadlineExceeded => {
            warn!("Timeout was hit! Deadline was exceeded");
        }
        Err(status) => return Err(status).context("unexpected error from GreetWithDeadline"),
    }
    Ok(())
}
