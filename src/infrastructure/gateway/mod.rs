//! Prediction service gateway over two transports.

mod rest;
mod rpc;

pub use rest::RestChannel;
pub use rpc::RpcChannel;

use crate::config::GatewayConfig;
use crate::domain::errors::GatewayError;
use crate::domain::ports::{PredictionGateway, RequestKind};
use async_trait::async_trait;
use serde_json::Value;

/// Live prediction service client: binary RPC primary, REST for health.
pub struct PredictionServiceClient {
    rpc: RpcChannel,
    rest: RestChannel,
}

impl PredictionServiceClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            rpc: RpcChannel::new(config.rpc_addr.clone(), config.request_timeout),
            rest: RestChannel::new(config.rest_base_url.clone(), config.request_timeout),
        }
    }
}

#[async_trait]
impl PredictionGateway for PredictionServiceClient {
    async fn call(&self, kind: RequestKind, params: &Value) -> Result<Value, GatewayError> {
        match kind {
            RequestKind::Health => {
                let status = self.rest.health().await?;
                serde_json::to_value(status).map_err(|e| GatewayError::Protocol(e.to_string()))
            }
            _ => self.rpc.request(kind.method(), params).await,
        }
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.rpc.close().await;
        Ok(())
    }
}
