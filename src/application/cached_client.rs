//! Caching front for the prediction gateway.
//!
//! Every call to the prediction service goes through this client. Responses
//! to read-style requests are memoized under a fingerprint of the request,
//! bounded by a TTL and a maximum entry count (LRU eviction). Concurrent
//! callers sharing a fingerprint are coalesced into a single upstream call.

use crate::domain::errors::ClientError;
use crate::domain::ports::{
    FeedbackPayload, HealthStatus, PredictionGateway, PredictionRequest, PredictionResponse,
    RequestKind, StrategyCandidate,
};
use crate::domain::types::{TrainingConfig, TrainingJob};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 1000,
        }
    }
}

/// Point-in-time snapshot of the hit/miss counters
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub ratio: f64,
}

struct CacheEntry {
    value: Value,
    inserted: Instant,
    last_used: Instant,
}

pub struct CachedPredictionClient {
    gateway: Arc<dyn PredictionGateway>,
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Per-fingerprint leader locks for duplicate suppression
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    closed: AtomicBool,
}

impl CachedPredictionClient {
    pub fn new(gateway: Arc<dyn PredictionGateway>, config: CacheConfig) -> Self {
        Self {
            gateway,
            config,
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Issue a request through the cache.
    ///
    /// Mutating kinds bypass memoization entirely. For cacheable kinds a
    /// fresh entry is served without touching the gateway; otherwise one
    /// caller performs the upstream call while concurrent callers for the
    /// same fingerprint wait and are served from the populated entry.
    /// Failed upstream calls are never cached.
    pub async fn call(&self, kind: RequestKind, params: &Value) -> Result<Value, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }

        if !kind.cacheable() {
            return Ok(self.gateway.call(kind, params).await?);
        }

        let key = fingerprint(kind, params);

        if let Some(value) = self.lookup(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _leader = flight.lock().await;

        // A leader may have populated the entry while we waited for the lock.
        if let Some(value) = self.lookup(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {} ({})", kind.method(), &key[..12]);

        let outcome = self.gateway.call(kind, params).await;

        if let Ok(value) = &outcome {
            self.insert(key.clone(), value.clone()).await;
        }
        self.flights.lock().await.remove(&key);

        Ok(outcome?)
    }

    async fn lookup(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(key) {
            Some(entry) if entry.inserted.elapsed() < self.config.ttl => {
                entry.last_used = Instant::now();
                Some(entry.value.clone())
            }
            Some(_) => {
                // Expired entries are never served.
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn insert(&self, key: String, value: Value) {
        if self.config.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.lock().await;
        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            let lru = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(lru_key) = lru {
                debug!("Evicting LRU cache entry {}", &lru_key[..12]);
                entries.remove(&lru_key);
            }
        }

        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted: now,
                last_used: now,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let ratio = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        CacheStats { hits, misses, ratio }
    }

    /// Release the underlying transport. Calls after the first close fail
    /// with a "client closed" error.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        self.gateway.close().await?;
        Ok(())
    }

    // ---- Typed request surface -------------------------------------------

    pub async fn generate_strategies(
        &self,
        risk_level: &str,
        target_return: f64,
        count: usize,
    ) -> Result<Vec<StrategyCandidate>, ClientError> {
        let params = serde_json::json!({
            "risk_level": risk_level,
            "target_return": target_return,
            "count": count,
        });
        let value = self.call(RequestKind::GenerateStrategies, &params).await?;
        decode(value)
    }

    pub async fn predict(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictionResponse, ClientError> {
        let params = encode(request)?;
        let value = self.call(RequestKind::Predict, &params).await?;
        decode(value)
    }

    pub async fn predict_batch(
        &self,
        requests: &[PredictionRequest],
    ) -> Result<Vec<PredictionResponse>, ClientError> {
        let params = encode(&requests)?;
        let value = self.call(RequestKind::PredictBatch, &params).await?;
        decode(value)
    }

    pub async fn submit_feedback(&self, payload: &FeedbackPayload) -> Result<(), ClientError> {
        let params = encode(payload)?;
        self.call(RequestKind::SubmitFeedback, &params).await?;
        Ok(())
    }

    pub async fn train(&self, config: &TrainingConfig) -> Result<TrainingJob, ClientError> {
        let params = encode(config)?;
        let value = self.call(RequestKind::TriggerTraining, &params).await?;
        decode(value)
    }

    pub async fn training_status(&self, job_id: &str) -> Result<TrainingJob, ClientError> {
        let params = serde_json::json!({ "job_id": job_id });
        let value = self.call(RequestKind::TrainingStatus, &params).await?;
        decode(value)
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let value = self.call(RequestKind::Health, &Value::Null).await?;
        decode(value)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| {
        ClientError::Gateway(crate::domain::errors::GatewayError::Protocol(e.to_string()))
    })
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value).map_err(|e| {
        ClientError::Gateway(crate::domain::errors::GatewayError::Protocol(format!(
            "Unexpected response shape: {}",
            e
        )))
    })
}

/// Deterministic digest over (request kind, normalized payload).
///
/// Object keys are sorted recursively and numbers rendered in a canonical
/// form, so logically identical requests collide regardless of field order
/// or numeric formatting (1 vs 1.0).
pub fn fingerprint(kind: RequestKind, params: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.method().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonicalize(params).as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                // f64 Display already collapses 2.0 to "2"
                n.as_f64().map(|f| f.to_string()).unwrap_or_default()
            }
        }
        Value::String(s) => serde_json::to_string(s).unwrap_or_default(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", inner.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), canonicalize(&map[*k])))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
    }
}
