use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, header};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::timeout;

use crate::dispatch::OutboundCall;
use crate::errors::AggregatorError;

/// Issues one upstream call and decodes the body as JSON.
///
/// The timeout covers the whole exchange: connecting, sending, and
/// collecting the complete response body. Any failure mode — connect error,
/// timeout, non-2xx status, body read error, malformed JSON — maps to an
/// error so the dispatcher can turn it into an absent slot.
pub async fn fetch_json(
    client: &Client<HttpConnector, Full<Bytes>>,
    call: &OutboundCall,
    call_timeout: Duration,
) -> Result<JsonValue, AggregatorError> {
    let mut builder = Request::builder()
        .method(call.method.clone())
        .uri(call.uri.as_str());
    if call.body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    let request = builder
        .body(Full::new(call.body.clone().unwrap_or_default()))
        .map_err(|e| AggregatorError::Internal(format!("failed to build request: {e}")))?;

    let exchange = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| AggregatorError::UpstreamRequest(call.uri.clone(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(AggregatorError::UpstreamStatus(
                call.uri.clone(),
                response.status().as_u16(),
            ));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|e| AggregatorError::ResponseBody(e.to_string()))?;

        serde_json::from_slice(&body)
            .map_err(|e| AggregatorError::UpstreamPayload(call.uri.clone(), e.to_string()))
    };

    timeout(call_timeout, exchange)
        .await
        .map_err(|_| AggregatorError::UpstreamTimeout(call.uri.clone()))?
}
