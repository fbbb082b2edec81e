//! Wire messages for the calculator and greet services.

pub mod calculator {
    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct SumRequest {
        #[prost(int32, tag = "1")]
        pub first_number: i32,
        #[prost(int32, tag = "2")]
        pub second_number: i32,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct SumResponse {
        #[prost(int32, tag = "1")]
        pub sum_result: i32,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct PrimeNumberDecompositionRequest {
        #[prost(int64, tag = "1")]
        pub number: i64,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct PrimeNumberDecompositionResponse {
        #[prost(int64, tag = "1")]
        pub prime_factor: i64,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct ComputeAverageRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct ComputeAverageResponse {
        #[prost(double, tag = "1")]
        pub average: f64,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct FindMaximumRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct FindMaximumResponse {
        #[prost(int32, tag = "1")]
        pub maximum: i32,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct SquareRootRequest {
        #[prost(int32, tag = "1")]
        pub number: i32,
    }

    #[derive(Clone, Copy, PartialEq, prost::Message)]
    pub struct SquareRootResponse {
        #[prost(double, tag = "1")]
        pub number_root: f64,
    }
}

pub mod greet {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Greeting {
        #[prost(string, tag = "1")]
        pub first_name: String,
        #[prost(string, tag = "2")]
        pub last_name: String,
    }

    impl Greeting {
        pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
            Self {
                first_name: first_name.into(),
                last_name: last_name.into(),
            }
        }
    }

    /// Request and response pairs that wrap a [`Greeting`] and answer with a string.
    macro_rules! greeting_messages {
        ($($request:ident => $response:ident),+ $(,)?) => {
            $(
                #[derive(Clone, PartialEq, prost::Message)]
                pub struct $request {
                    #[prost(message, optional, tag = "1")]
                    pub greeting: Option<Greeting>,
                }

                impl $request {
                    pub fn new(greeting: Greeting) -> Self {
                        Self { greeting: Some(greeting) }
                    }

                    pub fn first_name(&self) -> &str {
                        self.greeting.as_ref().map_or("", |g| g.first_name.as_str())
                    }

                    pub fn last_name(&self) -> &str {
                        self.greeting.as_ref().map_or("", |g| g.last_name.as_str())
                    }
                }

                #[derive(Clone, PartialEq, prost::Message)]
                pub struct $response {
                    #[prost(string, tag = "1")]
                    pub result: String,
                }
            )+
        };
    }

    greeting_messages! {
        GreetRequest => GreetResponse,
        GreetManyTimesRequest => GreetManyTimesResponse,
        LongGreetRequest => LongGreetResponse,
        GreetEveryoneRequest => GreetEveryoneResponse,
        GreetWithDeadlineRequest => GreetWithDeadlineResponse,
    }
}
