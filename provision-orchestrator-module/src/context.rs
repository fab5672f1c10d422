//! Per-call context handed to every module operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default lifetime of a [`LookupCache`] entry.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Short-lived cache for identifiers an adapter resolves on the way to its real call
/// (a reseller's shared IP, a customer id).
///
/// One cache is created per lifecycle transition and passed into every call made
/// for it, keyed by `(module, key)`. Nothing outlives the transition.
#[derive(Debug)]
pub struct LookupCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, String), (String, Instant)>>,
}

impl Default for LookupCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }
}

impl LookupCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, module: &str, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(&(module.to_string(), key.to_string()))
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    pub async fn put(&self, module: &str, key: &str, value: impl Into<String>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            (module.to_string(), key.to_string()),
            (value.into(), Instant::now()),
        );
    }
}

/// One raw HTTP exchange captured during a module call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub method: String,
    /// Endpoint or command name. Never contains credentials.
    pub endpoint: String,
    pub status: Option<u16>,
    pub body: String,
}

/// Context for a single module invocation.
///
/// The call wrapper builds one per attempt, reads the transcript afterwards and
/// redacts every registered secret before anything is stored.
#[derive(Debug)]
pub struct CallContext {
    correlation_id: Uuid,
    cache: Arc<LookupCache>,
    transcript: Mutex<Vec<Exchange>>,
    secrets: Mutex<Vec<String>>,
    sensitive_response: AtomicBool,
}

impl CallContext {
    pub fn new(correlation_id: Uuid, cache: Arc<LookupCache>) -> Self {
        Self {
            correlation_id,
            cache,
            transcript: Mutex::new(Vec::new()),
            secrets: Mutex::new(Vec::new()),
            sensitive_response: AtomicBool::new(false),
        }
    }

    /// Context with a fresh correlation id and cache, for ad-hoc calls.
    pub fn detached() -> Self {
        Self::new(Uuid::new_v4(), Arc::new(LookupCache::default()))
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn record_exchange(&self, exchange: Exchange) {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(exchange);
    }

    pub fn take_transcript(&self) -> Vec<Exchange> {
        std::mem::take(&mut *self.transcript.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Registers a value that must never appear in stored output.
    pub fn register_secret(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.is_empty() {
            return;
        }
        let mut secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        if !secrets.contains(&secret) {
            secrets.push(secret);
        }
    }

    /// Marks the responses of this call as carrying secrets the adapter only learns after parsing.
    /// Their bodies are kept out of the debug log.
    pub fn mark_response_sensitive(&self) {
        self.sensitive_response.store(true, Ordering::Relaxed);
    }

    pub fn response_is_sensitive(&self) -> bool {
        self.sensitive_response.load(Ordering::Relaxed)
    }

    /// Replaces every registered secret (and its url-encoded form) with `***`.
    pub fn redact(&self, text: &str) -> String {
        let secrets = self.secrets.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = text.to_string();
        for secret in secrets.iter() {
            out = out.replace(secret.as_str(), "***");
            let encoded = urlencoding::encode(secret);
            if encoded != secret.as_str() {
                out = out.replace(encoded.as_ref(), "***");
            }
        }
        out
    }
}
