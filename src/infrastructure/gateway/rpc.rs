//! Binary RPC channel to the prediction service.
//!
//! Length-delimited frames carrying JSON request/response envelopes over a
//! persistent TCP connection. The connection is lazily established and
//! dropped on any transport error so the next request reconnects.

use crate::domain::errors::GatewayError;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct RpcChannel {
    addr: String,
    request_timeout: Duration,
    conn: Mutex<Option<Framed<TcpStream, LengthDelimitedCodec>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl RpcChannel {
    pub fn new(addr: String, request_timeout: Duration) -> Self {
        Self {
            addr,
            request_timeout,
            conn: Mutex::new(None),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Issue one request and wait for its correlated response.
    pub async fn request(&self, method: &str, params: &Value) -> Result<Value, GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::ChannelClosed);
        }

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let Some(framed) = guard.as_mut() else {
            return Err(GatewayError::ChannelClosed);
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let request = RpcRequest { id, method, params };
        let frame =
            serde_json::to_vec(&request).map_err(|e| GatewayError::Protocol(e.to_string()))?;

        debug!("RPC -> {} (id {})", method, id);

        if let Err(e) = self
            .deadline(framed.send(Bytes::from(frame)))
            .await
            .and_then(|r| r.map_err(|e| self.unreachable(e.to_string())))
        {
            *guard = None;
            return Err(e);
        }

        loop {
            let frame = match self.deadline(framed.next()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => {
                    *guard = None;
                    return Err(self.unreachable(e.to_string()));
                }
                Ok(None) => {
                    *guard = None;
                    return Err(GatewayError::ChannelClosed);
                }
                Err(e) => {
                    *guard = None;
                    return Err(e);
                }
            };

            let response: RpcResponse = serde_json::from_slice(&frame)
                .map_err(|e| GatewayError::Protocol(e.to_string()))?;

            // Responses to requests that already timed out are discarded.
            if response.id != id {
                debug!("Discarding stale RPC response (id {})", response.id);
                continue;
            }

            return match (response.result, response.error) {
                (_, Some(message)) => Err(GatewayError::Service(message)),
                (Some(result), None) => Ok(result),
                (None, None) => Err(GatewayError::Protocol(
                    "Response carried neither result nor error".to_string(),
                )),
            };
        }
    }

    async fn connect(&self) -> Result<Framed<TcpStream, LengthDelimitedCodec>, GatewayError> {
        let stream = self
            .deadline(TcpStream::connect(&self.addr))
            .await?
            .map_err(|e| self.unreachable(e.to_string()))?;
        info!("RPC channel connected to {}", self.addr);
        Ok(Framed::new(stream, LengthDelimitedCodec::new()))
    }

    async fn deadline<F: std::future::Future>(&self, fut: F) -> Result<F::Output, GatewayError> {
        timeout(self.request_timeout, fut)
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            })
    }

    fn unreachable(&self, reason: String) -> GatewayError {
        GatewayError::Unreachable {
            addr: self.addr.clone(),
            reason,
        }
    }

    /// Drop the connection and refuse further requests.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut guard = self.conn.lock().await;
        if guard.take().is_some() {
            info!("RPC channel to {} closed", self.addr);
        }
    }
}
