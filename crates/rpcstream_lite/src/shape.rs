use std::fmt;

/// The four interaction shapes a session can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// One request, one response.
    Unary,
    /// One request, a sequence of responses.
    ServerStreaming,
    /// A sequence of requests, one response.
    ClientStreaming,
    /// A sequence of requests and an independent sequence of responses.
    BidiStreaming,
}

impl Shape {
    /// Whether requests flow through a persistent inbound channel.
    pub fn has_inbound(&self) -> bool {
        matches!(self, Shape::ClientStreaming | Shape::BidiStreaming)
    }

    /// Whether responses flow through a persistent outbound channel.
    pub fn has_outbound(&self) -> bool {
        matches!(self, Shape::ServerStreaming | Shape::BidiStreaming)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Unary => "unary",
            Shape::ServerStreaming => "server-streaming",
            Shape::ClientStreaming => "client-streaming",
            Shape::BidiStreaming => "bidi-streaming",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_per_shape() {
        assert!(!Shape::Unary.has_inbound() && !Shape::Unary.has_outbound());
        assert!(!Shape::ServerStreaming.has_inbound() && Shape::ServerStreaming.has_outbound());
        assert!(Shape::ClientStreaming.has_inbound() && !Shape::ClientStreaming.has_outbound());
        assert!(Shape::BidiStreaming.has_inbound() && Shape::BidiStreaming.has_outbound());
    }
}
