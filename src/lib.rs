pub mod calculator;
pub mod greet;
pub mod proto;

use std::time::Duration;

use anyhow::Result;
use rpcstream_lite::{ClientConfig, Registry, RpcClient};

pub use greet::GreetConfig;

/// Registry holding both the calculator and the greet services.
pub fn registry(greet_config: GreetConfig) -> Result<Registry> {
    let mut registry = Registry::new();
    calculator::register(&mut registry)?;
    greet::register(&mut registry, greet_config)?;
    Ok(registry)
}

/// An in-process client over [`registry`].
pub fn connect(greet_config: GreetConfig, config: ClientConfig) -> Result<RpcClient> {
    Ok(RpcClient::new(registry(greet_config)?, config))
}

/// Read a millisecond duration from the environment, ignoring unset or malformed values.
pub fn duration_from_env(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Install the fmt subscriber used by the binaries, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_serves_both_services() {
        let registry = registry(GreetConfig::default()).unwrap();
        assert_eq!(registry.len(), 10);
        assert!(registry.has_handler(calculator::FIND_MAXIMUM));
        assert!(registry.has_handler(greet::GREET_WITH_DEADLINE));
    }
}
