use anyhow::{Context, Result};
use rpc_shapes::proto::calculator::{
    ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
    PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
    SquareRootResponse, SumRequest, SumResponse,
};
use rpc_shapes::{GreetConfig, calculator, connect, duration_from_env, init_tracing};
use rpcstream_lite::{CallOptions, ClientConfig, Code, RpcClient};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut config = ClientConfig::default();
    if let Some(deadline) = duration_from_env("RPC_DEADLINE_MS") {
        config = config.with_default_deadline(deadline);
    }
    let client = connect(GreetConfig::default(), config)?;

    do_unary(&client).await?;
    do_server_streaming(&client).await?;
    do_client_streaming(&client).await?;
    do_bidi_streaming(&client).await?;
    do_error_unary(&client, 10).await?;
    do_error_unary(&client, -2).await?;

    Ok(())
}

async fn do_unary(client: &RpcClient) -> Result<()> {
    info!("Starting to do a Sum unary RPC");

    let reply: SumResponse = client
        .call_unary(
            calculator::SUM,
            &SumRequest {
                first_number: 3,
                second_number: 10,
            },
            CallOptions::default(),
        )
        .await
        .context("error while calling Sum RPC")?;

    info!(sum_result = reply.sum_result, "Response from Sum");
    Ok(())
}

async fn do_server_streaming(client: &RpcClient) -> Result<()> {
    info!("Starting to do a PrimeNumberDecomposition server streaming RPC");

    let mut stream = client
        .call_server_stream::<_, PrimeNumberDecompositionResponse>(
            calculator::PRIME_NUMBER_DECOMPOSITION,
            &PrimeNumberDecompositionRequest {
                number: 12390392840,
            },
            CallOptions::default(),
        )
        .await
        .context("error while calling PrimeNumberDecomposition RPC")?;

    while let Some(reply) = stream
        .message()
        .await
        .context("error while reading prime factors")?
    {
        info!(prime_factor = reply.prime_factor, "Response from PrimeNumberDecomposition");
    }
    Ok(())
}

async fn do_client_streaming(client: &RpcClient) -> Result<()> {
    info!("Starting to do a ComputeAverage client streaming RPC");

    let (mut sink, reply) = client
        .call_client_stream::<ComputeAverageRequest, ComputeAverageResponse>(
            calculator::COMPUTE_AVERAGE,
            CallOptions::default(),
        )
        .await
        .context("error while opening ComputeAverage stream")?;

    for number in [3, 5, 9, 54, 23] {
        info!(number, "Sending number");
        sink.send(&ComputeAverageRequest { number }).await?;
    }
    sink.close()?;

    let reply = reply
        .await
        .context("error while receiving ComputeAverage response")?;
    info!(average = reply.average, "Response from ComputeAverage");
    Ok(())
}

async fn do_bidi_streaming(client: &RpcClient) -> Result<()> {
    info!("Starting to do a FindMaximum bidi streaming RPC");

    let (mut sink, mut responses) = client
        .call_bidi_stream::<FindMaximumRequest, FindMaximumResponse>(
            calculator::FIND_MAXIMUM,
            CallOptions::default(),
        )
        .await
        .context("error while opening FindMaximum stream")?;

    let sender = tokio::spawn(async move {
        for number in [4, 7, 2, 19, 4, 6, 32] {
            info!(number, "Sending number");
            sink.send(&FindMaximumRequest { number }).await?;
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        sink.close()
    });

    while let Some(reply) = responses.message().await? {
        info!(maximum = reply.maximum, "Received a new maximum");
    }
    sender.await??;
    Ok(())
}

async fn do_error_unary(client: &RpcClient, number: i32) -> Result<()> {
    info!(number, "Starting to do a SquareRoot unary RPC");

    let result = client
        .call_unary::<_, SquareRootResponse>(
            calculator::SQUARE_ROOT,
            &SquareRootRequest { number },
            CallOptions::default(),
        )
        .await;

    match result {
        Ok(reply) => info!(number, number_root = reply.number_root, "Response from SquareRoot"),
        Err(status) if status.code() == Code::InvalidArgument => {
            info!(error = %status, "We probably sent a negative number");
        }
        Err(status) => return Err(status).context("unexpected error from SquareRoot"),
    }
    Ok(())
}
