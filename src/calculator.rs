//! Arithmetic service exercising each interaction shape.

use rpcstream_lite::{HandlerContext, Registry, RegistryError, RequestStream, ResponseSink, Status};
use tracing::{debug, info};

use crate::proto::calculator::{
    ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
    PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
    SquareRootResponse, SumRequest, SumResponse,
};

pub const SERVICE: &str = "calculator.CalculatorService";

pub const SUM: &str = "calculator.CalculatorService/Sum";
pub const PRIME_NUMBER_DECOMPOSITION: &str = "calculator.CalculatorService/PrimeNumberDecomposition";
pub const COMPUTE_AVERAGE: &str = "calculator.CalculatorService/ComputeAverage";
pub const FIND_MAXIMUM: &str = "calculator.CalculatorService/FindMaximum";
pub const SQUARE_ROOT: &str = "calculator.CalculatorService/SquareRoot";

/// Register every calculator method.
pub fn register(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register_unary(SUM, sum)?;
    registry.register_server_stream(PRIME_NUMBER_DECOMPOSITION, prime_number_decomposition)?;
    registry.register_client_stream(COMPUTE_AVERAGE, compute_average)?;
    registry.register_bidi_stream(FIND_MAXIMUM, find_maximum)?;
    registry.register_unary(SQUARE_ROOT, square_root)?;
    Ok(())
}

async fn sum(_ctx: HandlerContext, req: SumRequest) -> Result<SumResponse, Status> {
    info!(
        first_number = req.first_number,
        second_number = req.second_number,
        "Received Sum RPC"
    );

    let sum_result = req
        .first_number
        .checked_add(req.second_number)
        .ok_or_else(|| {
            Status::invalid_argument(format!(
                "sum of {} and {} overflows a 32-bit integer",
                req.first_number, req.second_number
            ))
        })?;

    Ok(SumResponse { sum_result })
}

async fn prime_number_decomposition(
    ctx: HandlerContext,
    req: PrimeNumberDecompositionRequest,
    mut responses: ResponseSink<PrimeNumberDecompositionResponse>,
) -> Result<(), Status> {
    info!(number = req.number, "Received PrimeNumberDecomposition RPC");

    if req.number <= 0 {
        return Err(Status::invalid_argument(format!(
            "expected a positive number, received: {}",
            req.number
        )));
    }

    let mut factors = PrimeFactors::new(req.number);
    loop {
        match factors.search(SEARCH_BATCH) {
            Search::Factor(prime_factor) => {
                ctx.check()?;
                responses
                    .send(&PrimeNumberDecompositionResponse { prime_factor })
                    .await?;
            }
            Search::Pending => {
                ctx.check()?;
                tokio::task::yield_now().await;
            }
            Search::Done => return Ok(()),
        }
    }
}

async fn compute_average(
    _ctx: HandlerContext,
    mut requests: RequestStream<ComputeAverageRequest>,
) -> Result<ComputeAverageResponse, Status> {
    info!("Received ComputeAverage RPC");

    let mut sum = 0i64;
    let mut count = 0u64;
    while let Some(req) = requests.message().await? {
        sum += i64::from(req.number);
        count += 1;
    }

    if count == 0 {
        return Err(Status::invalid_argument(
            "cannot compute the average of zero numbers",
        ));
    }

    Ok(ComputeAverageResponse {
        average: sum as f64 / count as f64,
    })
}

async fn find_maximum(
    _ctx: HandlerContext,
    mut requests: RequestStream<FindMaximumRequest>,
    mut responses: ResponseSink<FindMaximumResponse>,
) -> Result<(), Status> {
    info!("Received FindMaximum RPC");

    // Empty until the first number arrives, so negative streams still report a maximum.
    let mut maximum: Option<i32> = None;
    while let Some(req) = requests.message().await? {
        debug!(number = req.number, "FindMaximum received a number");
        if maximum.is_none_or(|current| req.number > current) {
            maximum = Some(req.number);
            responses
                .send(&FindMaximumResponse {
                    maximum: req.number,
                })
                .await?;
        }
    }
    Ok(())
}

async fn square_root(_ctx: HandlerContext, req: SquareRootRequest) -> Result<SquareRootResponse, Status> {
    info!(number = req.number, "Received SquareRoot RPC");

    if req.number < 0 {
        return Err(Status::invalid_argument(format!(
            "received a negative number: {}",
            req.number
        )));
    }

    Ok(SquareRootResponse {
        number_root: f64::from(req.number).sqrt(),
    })
}

/// Trial divisors tried between cancellation checks.
const SEARCH_BATCH: u32 = 4096;

/// Outcome of a bounded step of the factor search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Search {
    Factor(i64),
    /// The budget ran out before the next factor was found.
    Pending,
    Done,
}

/// Prime factors of a positive number in ascending order, with multiplicity.
#[derive(Debug, Clone)]
pub struct PrimeFactors {
    remaining: i64,
    divisor: i64,
}

impl PrimeFactors {
    pub fn new(number: i64) -> Self {
        Self {
            remaining: number,
            divisor: 2,
        }
    }

    /// Try at most `budget` trial divisors looking for the next factor.
    pub fn search(&mut self, budget: u32) -> Search {
        for _ in 0..budget {
            if self.remaining <= 1 {
                return Search::Done;
            }
            // No divisor left below the square root: what remains is prime.
            if self
                .divisor
                .checked_mul(self.divisor)
                .is_none_or(|square| square > self.remaining)
            {
                let prime = self.remaining;
                self.remaining = 1;
                return Search::Factor(prime);
            }
            if self.remaining % self.divisor == 0 {
                self.remaining /= self.divisor;
                return Search::Factor(self.divisor);
            }
            self.divisor += 1;
        }
        if self.remaining <= 1 {
            Search::Done
        } else {
            Search::Pending
        }
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        loop {
            match self.search(SEARCH_BATCH) {
                Search::Factor(factor) => return Some(factor),
                Search::Pending => {}
                Search::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rpcstream_lite::{CallOptions, ClientConfig, Code, RpcClient};
    use std::time::Duration;

    fn client() -> RpcClient {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        RpcClient::new(registry, ClientConfig::default())
    }

    async fn decompose(client: &RpcClient, number: i64) -> Result<Vec<i64>, Status> {
        let stream = client
            .call_server_stream::<_, PrimeNumberDecompositionResponse>(
                PRIME_NUMBER_DECOMPOSITION,
                &PrimeNumberDecompositionRequest { number },
                CallOptions::default(),
            )
            .await?;
        stream.map(|reply| reply.map(|r| r.prime_factor)).collect::<Vec<_>>().await.into_iter().collect()
    }

    async fn maxima(client: &RpcClient, numbers: Vec<i32>) -> Vec<i32> {
        let (mut sink, responses) = client
            .call_bidi_stream::<FindMaximumRequest, FindMaximumResponse>(
                FIND_MAXIMUM,
                CallOptions::default(),
            )
            .await
            .unwrap();

        let sender = tokio::spawn(async move {
            for number in numbers {
                sink.send(&FindMaximumRequest { number }).await?;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            sink.close()
        });

        let found = responses.map(|reply| reply.unwrap().maximum).collect().await;
        sender.await.unwrap().unwrap();
        found
    }

    async fn average(client: &RpcClient, numbers: &[i32]) -> Result<f64, Status> {
        let (mut sink, reply) = client
            .call_client_stream::<ComputeAverageRequest, ComputeAverageResponse>(
                COMPUTE_AVERAGE,
                CallOptions::default(),
            )
            .await?;
        for &number in numbers {
            sink.send(&ComputeAverageRequest { number }).await?;
        }
        sink.close()?;
        Ok(reply.await?.average)
    }

    #[test]
    fn test_prime_factors() {
        assert_eq!(
            PrimeFactors::new(12390392840).collect::<Vec<_>>(),
            vec![2, 2, 2, 5, 7, 7, 163, 38783]
        );
        assert_eq!(PrimeFactors::new(120).collect::<Vec<_>>(), vec![2, 2, 2, 3, 5]);
        assert_eq!(PrimeFactors::new(97).collect::<Vec<_>>(), vec![97]);
        assert_eq!(PrimeFactors::new(1).count(), 0);
        assert_eq!(
            PrimeFactors::new(i64::MAX).product::<i64>(),
            i64::MAX
        );
    }

    #[tokio::test]
    async fn test_sum() {
        let client = client();

        let reply: SumResponse = client
            .call_unary(
                SUM,
                &SumRequest {
                    first_number: 3,
                    second_number: 10,
                },
                CallOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(reply.sum_result, 13);

        let err = client
            .call_unary::<_, SumResponse>(
                SUM,
                &SumRequest {
                    first_number: i32::MAX,
                    second_number: 1,
                },
                CallOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_prime_number_decomposition_streams_sorted_factors() {
        let client = client();

        assert_eq!(
            decompose(&client, 12390392840).await.unwrap(),
            vec![2, 2, 2, 5, 7, 7, 163, 38783]
        );
        assert_eq!(decompose(&client, 210).await.unwrap(), vec![2, 3, 5, 7]);
        assert!(decompose(&client, 1).await.unwrap().is_empty());
    }

    #[test]
    fn test_prime_search_is_bounded() {
        let mut factors = PrimeFactors::new(2305843009213693951);
        assert_eq!(factors.search(16), Search::Pending);
        assert_eq!(factors.search(16), Search::Pending);

        let mut factors = PrimeFactors::new(12);
        assert_eq!(factors.search(1), Search::Factor(2));
        assert_eq!(factors.search(1), Search::Factor(2));
        assert_eq!(factors.search(1), Search::Factor(3));
        assert_eq!(factors.search(1), Search::Done);
    }

    #[tokio::test]
    async fn test_prime_search_observes_deadline() {
        let (done, mut finished) = tokio::sync::mpsc::unbounded_channel();
        let mut registry = Registry::new();
        registry
            .register_server_stream(PRIME_NUMBER_DECOMPOSITION, move |ctx, req, responses| {
                let done = done.clone();
                async move {
                    let result = prime_number_decomposition(ctx, req, responses).await;
                    let _ = done.send(result.clone());
                    result
                }
            })
            .unwrap();
        // Long grace: the handler has to stop on its own, not be aborted.
        let client = RpcClient::new(
            registry,
            ClientConfig::default().with_cancel_grace(Duration::from_secs(60)),
        );

        let started = std::time::Instant::now();
        let mut stream = client
            .call_server_stream::<_, PrimeNumberDecompositionResponse>(
                PRIME_NUMBER_DECOMPOSITION,
                // 2^61 - 1 is prime, so the search runs up to its square root.
                &PrimeNumberDecompositionRequest {
                    number: 2305843009213693951,
                },
                CallOptions::builder()
                    .deadline(Duration::from_millis(100))
                    .build(),
            )
            .await
            .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), stream.message())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(2));

        let observed = tokio::time::timeout(Duration::from_secs(1), finished.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observed.unwrap_err().code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_prime_number_decomposition_rejects_non_positive() {
        let client = client();

        for number in [0, -12] {
            let err = decompose(&client, number).await.unwrap_err();
            assert_eq!(err.code(), Code::InvalidArgument);
        }
    }

    #[tokio::test]
    async fn test_compute_average() {
        let client = client();
        assert_eq!(average(&client, &[3, 5, 9, 54, 23]).await.unwrap(), 18.8);
        assert_eq!(average(&client, &[1, 2]).await.unwrap(), 1.5);
    }

    #[tokio::test]
    async fn test_compute_average_of_nothing_is_invalid() {
        let client = client();
        let err = average(&client, &[]).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_find_maximum_emits_each_new_maximum_once() {
        let client = client();
        assert_eq!(
            maxima(&client, vec![4, 7, 2, 19, 4, 6, 32]).await,
            vec![4, 7, 19, 32]
        );
        assert_eq!(maxima(&client, vec![5, 5, 5]).await, vec![5]);
        assert!(maxima(&client, vec![]).await.is_empty());
    }

    #[tokio::test]
    async fn test_find_maximum_handles_negative_numbers() {
        let client = client();
        assert_eq!(maxima(&client, vec![-5, -3, -9]).await, vec![-5, -3]);
    }

    #[tokio::test]
    async fn test_square_root() {
        let client = client();

        let reply: SquareRootResponse = client
            .call_unary(SQUARE_ROOT, &SquareRootRequest { number: 16 }, CallOptions::default())
            .await
            .unwrap();
        assert_eq!(reply.number_root, 4.0);

        let err = client
            .call_unary::<_, SquareRootResponse>(
                SQUARE_ROOT,
                &SquareRootRequest { number: -2 },
                CallOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), "received a negative number: -2");
    }

    #[test]
    fn test_registers_every_method() {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        assert_eq!(registry.len(), 5);
        assert!(registry.methods().all(|method| method.starts_with(SERVICE)));
        assert!(register(&mut registry).is_err());
    }
}
