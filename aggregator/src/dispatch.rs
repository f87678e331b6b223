//! Concurrent fan-out of one logical request to many upstream sources.

use http_body_util::Full;
use hyper::Method;
use hyper::body::Bytes;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::http::fetch_json;

/// One prepared upstream call, ready for dispatch.
#[derive(Clone, Debug)]
pub struct OutboundCall {
    pub method: Method,
    pub uri: String,
    pub body: Option<Bytes>,
}

impl OutboundCall {
    pub fn get(uri: String) -> Self {
        Self {
            method: Method::GET,
            uri,
            body: None,
        }
    }

    pub fn post_json(uri: String, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            uri,
            body: Some(body),
        }
    }
}

/// Fans calls out in parallel with per-call failure isolation.
///
/// One dispatcher (and its pooled HTTP client) is shared by manifest
/// fetching at startup and by every resource request afterwards.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client<HttpConnector, Full<Bytes>>,
    call_timeout: Duration,
}

impl Dispatcher {
    pub fn new(call_timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            call_timeout,
        }
    }

    /// Issues every call concurrently and waits for all of them to finish.
    ///
    /// Slot `i` of the result corresponds to `calls[i]` regardless of
    /// completion order: each task carries its slot index and results are
    /// re-associated on join. A call that fails in any way (connect error,
    /// timeout, non-2xx, malformed body) leaves its slot empty without
    /// disturbing the other calls. One attempt per call; retries are a
    /// caller concern.
    pub async fn dispatch(&self, calls: Vec<OutboundCall>) -> Vec<Option<JsonValue>> {
        let mut slots: Vec<Option<JsonValue>> = vec![None; calls.len()];
        let mut join_set = JoinSet::new();

        for (index, call) in calls.into_iter().enumerate() {
            let client = self.client.clone();
            let call_timeout = self.call_timeout;
            metrics::counter!(shared::metrics::UPSTREAM_CALLS).increment(1);

            join_set.spawn(async move {
                let result = fetch_json(&client, &call, call_timeout).await;
                (index, call.uri, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, _, Ok(payload))) => slots[index] = Some(payload),
                Ok((_, uri, Err(error))) => {
                    metrics::counter!(shared::metrics::UPSTREAM_CALL_FAILURES).increment(1);
                    tracing::warn!(upstream = %uri, error = %error, "upstream call failed");
                }
                Err(error) => {
                    tracing::error!(error = %error, "upstream task panicked");
                }
            }
        }

        slots
    }
}
