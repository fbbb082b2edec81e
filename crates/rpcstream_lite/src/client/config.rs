use std::time::Duration;

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline applied to calls that do not set their own.
    pub default_deadline: Option<Duration>,

    /// Messages a session channel buffers before `send` waits for the consumer.
    pub channel_capacity: usize,

    /// How long a canceled handler may keep running before its task is aborted.
    pub cancel_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_deadline: None,
            channel_capacity: 16,
            cancel_grace: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline for calls without one of their own.
    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }

    /// Set the per-channel buffer size. Zero is treated as one.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }
}

/// Per-call settings.
///
/// ```ignore
/// let options = CallOptions::builder()
///     .deadline(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct CallOptions {
    /// Overrides [`ClientConfig::default_deadline`].
    pub deadline: Option<Duration>,
}

impl CallOptions {
    /// The deadline this call runs under, given the client-wide default.
    pub(crate) fn effective_deadline(&self, config: &ClientConfig) -> Option<Duration> {
        self.deadline.or(config.default_deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_deadline_overrides_default() {
        let config = ClientConfig::new().with_default_deadline(Duration::from_secs(1));

        let options = CallOptions::builder()
            .deadline(Duration::from_millis(50))
            .build();
        assert_eq!(
            options.effective_deadline(&config),
            Some(Duration::from_millis(50))
        );
        assert_eq!(
            CallOptions::default().effective_deadline(&config),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            CallOptions::default().effective_deadline(&ClientConfig::default()),
            None
        );
    }
}
