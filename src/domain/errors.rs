use thiserror::Error;

/// Errors raised by the prediction service transports (RPC and REST)
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Prediction service unreachable at {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Transport closed")]
    ChannelClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Prediction service rejected request: {0}")]
    Service(String),
}

/// Errors raised by the cached prediction client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Client closed")]
    Closed,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors that abort a discovery run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("Stage {stage} failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_formatting() {
        let err = GatewayError::Unreachable {
            addr: "127.0.0.1:9100".to_string(),
            reason: "connection refused".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:9100"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_client_closed_message() {
        assert_eq!(ClientError::Closed.to_string(), "Client closed");
    }
}
